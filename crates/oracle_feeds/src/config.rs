//! Per-chain RPC endpoints.
//!
//! Load from: env `ORACLE_FEEDS_ENDPOINTS_PATH`, or `./config/endpoints.json`, or `./endpoints.json`.
//!
//! ```json
//! { "endpoints": [
//!     { "chain_id": 1, "name": "mainnet", "url": "https://rpc.example.org" },
//!     { "chain_id": 137, "url": "https://polygon.example.org", "proof_of_authority": true }
//! ] }
//! ```

use crate::chain::{HeaderDecodeMode, RpcConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

pub const ENDPOINTS_PATH_ENV: &str = "ORACLE_FEEDS_ENDPOINTS_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no endpoint configured for chain {0}")]
    UnknownChain(u64),
    #[error("chain {chain_id}: invalid url {url}")]
    InvalidUrl { chain_id: u64, url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
    /// Start the connection in extended header decoding.
    #[serde(default)]
    pub proof_of_authority: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub endpoints: Vec<ChainEndpoint>,
}

impl EndpointsConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from the env path, then the default locations. Empty if none is readable.
    pub fn load() -> Self {
        let env_path = std::env::var(ENDPOINTS_PATH_ENV).ok();
        let candidates = env_path
            .iter()
            .map(|p| Path::new(p.as_str()))
            .chain([
                Path::new("./config/endpoints.json"),
                Path::new("./endpoints.json"),
            ]);
        for candidate in candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_path(candidate) {
                Ok(config) => {
                    debug!(
                        path = %candidate.display(),
                        count = config.endpoints.len(),
                        "loaded endpoints"
                    );
                    return config;
                }
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "ignoring endpoints file")
                }
            }
        }
        Self::default()
    }

    pub fn endpoint(&self, chain_id: u64) -> Option<&ChainEndpoint> {
        self.endpoints.iter().find(|e| e.chain_id == chain_id)
    }

    /// Add or replace the endpoint for `endpoint.chain_id`.
    pub fn with_endpoint(mut self, endpoint: ChainEndpoint) -> Self {
        self.endpoints.retain(|e| e.chain_id != endpoint.chain_id);
        self.endpoints.push(endpoint);
        self
    }

    pub fn rpc_config(&self, chain_id: u64) -> Result<RpcConfig, ConfigError> {
        let endpoint = self
            .endpoint(chain_id)
            .ok_or(ConfigError::UnknownChain(chain_id))?;
        if url::Url::parse(&endpoint.url).is_err() {
            return Err(ConfigError::InvalidUrl {
                chain_id,
                url: endpoint.url.clone(),
            });
        }
        let mut config = RpcConfig::new(endpoint.url.clone(), chain_id);
        if let Some(t) = endpoint.timeout_secs {
            config.timeout_secs = t;
        }
        if let Some(r) = endpoint.rate_limit_ms {
            config.rate_limit_ms = r;
        }
        if endpoint.proof_of_authority {
            config.decode_mode = HeaderDecodeMode::ExtendedFields;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_and_build_rpc_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"endpoints":[{{"chain_id":137,"url":"https://polygon.example.org","timeout_secs":5,"proof_of_authority":true}}]}}"#
        )
        .unwrap();
        let config = EndpointsConfig::load_from_path(tmp.path()).unwrap();
        let rpc = config.rpc_config(137).unwrap();
        assert_eq!(rpc.timeout_secs, 5);
        assert_eq!(rpc.decode_mode, HeaderDecodeMode::ExtendedFields);
        assert!(matches!(
            config.rpc_config(1),
            Err(ConfigError::UnknownChain(1))
        ));
    }

    #[test]
    fn with_endpoint_replaces_same_chain() {
        let config = EndpointsConfig::default()
            .with_endpoint(ChainEndpoint {
                chain_id: 1,
                url: "https://a.example.org".into(),
                ..Default::default()
            })
            .with_endpoint(ChainEndpoint {
                chain_id: 1,
                url: "https://b.example.org".into(),
                ..Default::default()
            });
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.rpc_config(1).unwrap().url, "https://b.example.org");
    }

    #[test]
    fn invalid_url_rejected() {
        let config = EndpointsConfig::default().with_endpoint(ChainEndpoint {
            chain_id: 5,
            url: "nope".into(),
            ..Default::default()
        });
        assert!(matches!(
            config.rpc_config(5),
            Err(ConfigError::InvalidUrl { chain_id: 5, .. })
        ));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();
        assert!(matches!(
            EndpointsConfig::load_from_path(tmp.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
