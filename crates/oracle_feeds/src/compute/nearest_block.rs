//! Nearest block at or before a timestamp, found by binary search over block numbers.
//!
//! Chains index blocks by number only. Timestamps are non-decreasing but neither
//! strictly increasing nor evenly spaced, so the search probes headers and narrows
//! the number range instead of interpolating.

use crate::chain::{BlockDataProvider, BlockHeader, ProviderError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Fetch one header, switching the connection to extended header decoding and
/// retrying once if the node's headers carry proof-of-authority fields.
pub async fn fetch_probe<P>(provider: &P, number: u64) -> Result<BlockHeader, ProviderError>
where
    P: BlockDataProvider + ?Sized,
{
    match provider.fetch_header(number).await {
        Err(e @ ProviderError::IncompatibleHeaderFormat { .. }) => {
            info!(
                block = number,
                error = %e,
                "POA chain detected, enabling extended header decoding"
            );
            if let Err(e) = provider.apply_compatibility_shim() {
                warn!(error = %e, "unable to apply header compatibility shim");
            }
            provider.fetch_header(number).await
        }
        other => other,
    }
}

/// Headers seen during one resolution. Discarded when the call returns.
struct Probe<'a, P: ?Sized> {
    provider: &'a P,
    seen: HashMap<u64, BlockHeader>,
}

impl<'a, P> Probe<'a, P>
where
    P: BlockDataProvider + ?Sized,
{
    fn new(provider: &'a P) -> Self {
        Self {
            provider,
            seen: HashMap::new(),
        }
    }

    async fn header(&mut self, number: u64) -> Result<BlockHeader, ProviderError> {
        if let Some(h) = self.seen.get(&number) {
            return Ok(h.clone());
        }
        let h = fetch_probe(self.provider, number).await?;
        self.seen.insert(number, h.clone());
        Ok(h)
    }

    /// First block in `[low, high]` with timestamp >= `target`; `high` if there is none.
    async fn first_at_or_after(
        &mut self,
        target: i64,
        mut low: u64,
        mut high: u64,
    ) -> Result<u64, ProviderError> {
        while low < high {
            let mid = low + (high - low) / 2;
            if self.header(mid).await?.timestamp < target {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }
}

/// Pick between two candidates: the one not later than `target`, else the closer
/// one; ties go to `first`.
fn closest_not_later(first: BlockHeader, second: BlockHeader, target: i64) -> BlockHeader {
    if first.timestamp > target {
        return second;
    }
    if second.timestamp > target {
        return first;
    }
    if second.timestamp.abs_diff(target) < first.timestamp.abs_diff(target) {
        second
    } else {
        first
    }
}

async fn try_resolve<P>(
    provider: &P,
    target: i64,
    low: u64,
    high: u64,
) -> Result<BlockHeader, ProviderError>
where
    P: BlockDataProvider + ?Sized,
{
    let mut probe = Probe::new(provider);

    if low > high {
        // Crossed range: nothing to search, compare the endpoints as given.
        let first = probe.header(low).await?;
        let second = probe.header(high).await?;
        return Ok(closest_not_later(first, second, target));
    }

    let start = low;
    let at_or_after = probe.first_at_or_after(target, low, high).await?;
    let upper = probe.header(at_or_after).await?;
    let lower = if at_or_after > start {
        probe.header(at_or_after - 1).await?
    } else {
        upper.clone()
    };
    let chosen = closest_not_later(lower, upper, target);

    // Blocks sharing a timestamp: the lowest number wins.
    if chosen.number > start {
        let prev = probe.header(chosen.number - 1).await?;
        if prev.timestamp == chosen.timestamp {
            let run_start = probe
                .first_at_or_after(chosen.timestamp, start, chosen.number)
                .await?;
            return probe.header(run_start).await;
        }
    }
    Ok(chosen)
}

/// Block in `[low, high]` closest to, but not after, `target` (Unix seconds).
///
/// Returns the lowest block of the range when `target` precedes it, and the
/// highest when `target` follows it. When `low > high` the two endpoint headers
/// are compared directly without searching. `None` if the provider failed at
/// any probe; there is no retry beyond the single compatibility-shim retry.
pub async fn resolve_nearest_block<P>(
    provider: &P,
    target: i64,
    low: u64,
    high: u64,
) -> Option<BlockHeader>
where
    P: BlockDataProvider + ?Sized,
{
    match try_resolve(provider, target, low, high).await {
        Ok(block) => {
            debug!(target, block = block.number, timestamp = block.timestamp, "nearest block");
            Some(block)
        }
        Err(e) => {
            info!(target, low, high, error = %e, "failed to fetch block info");
            None
        }
    }
}
