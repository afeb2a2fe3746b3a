//! Merge engine configuration
//!
//! 환경 변수와 JSON 파일에서 로드합니다. 환경 변수가 파일 값보다 우선합니다.

use crate::error::{ShardxError, ShardxResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Environment variable for [`MergeConfig::max_materialized_rows`]
pub const ENV_MAX_MATERIALIZED_ROWS: &str = "SHARDX_MERGE_MAX_MATERIALIZED_ROWS";
/// Environment variable for [`MergeConfig::timeout_ms`]
pub const ENV_TIMEOUT_MS: &str = "SHARDX_MERGE_TIMEOUT_MS";

/// Merge engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Rows a full-materialize merge may buffer before failing (`None` = unbounded)
    pub max_materialized_rows: Option<usize>,
    /// Per-request deadline in milliseconds (`None` = no deadline)
    pub timeout_ms: Option<u64>,
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> ShardxResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> ShardxResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay values found in the process environment.
    pub fn load_from_env(mut self) -> ShardxResult<Self> {
        if let Some(rows) = read_env(ENV_MAX_MATERIALIZED_ROWS)? {
            self.max_materialized_rows = Some(rows);
        }
        if let Some(ms) = read_env(ENV_TIMEOUT_MS)? {
            self.timeout_ms = Some(ms);
        }
        Ok(self)
    }

    /// File (if any) overlaid by the environment.
    pub fn load(path: Option<&Path>) -> ShardxResult<Self> {
        let base = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        let config = base.load_from_env()?;
        tracing::debug!(?config, "merge config loaded");
        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> ShardxResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ShardxError::Config(format!("{name}: invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
