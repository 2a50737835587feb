//! Engine configuration: the resource limits and logging knobs that bound
//! `simplify`/`loop` without threading a process-global anywhere (spec.md
//! §9, §5 supplemental). Loaded the way the teacher loads its own
//! `Config` — a layered `figment::Figment` merging a base TOML file, an
//! optional local-override TOML file, and environment variables — just
//! pointed at this crate's own field set instead of storage/optimization
//! knobs.
//!
//! ```toml
//! # engine.toml
//! max_inline_depth = 512
//! max_aggregation_iterations = 1_000_000
//! ```
//!
//! ```bash
//! DYNA_MAX_INLINE_DEPTH=1024
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Resource limits and logging level for one engine instance (spec.md §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounds `Call` inlining depth (`frame.call_stack.len()`). Exceeding it
    /// turns a `Call` into residue rather than overflowing the host stack;
    /// a residue surviving to the query surface becomes
    /// `EngineError::RecursionLimitExceeded`.
    #[serde(default = "default_max_inline_depth")]
    pub max_inline_depth: usize,

    /// Bounds how many `Terminal` branches an `Aggregator` simplification
    /// step may fold before surfacing
    /// `EngineError::ResourceLimitExceeded { stage: "aggregator", .. }`.
    /// `None` means unbounded — only appropriate when every aggregator body
    /// is known to saturate or is otherwise finite.
    #[serde(default)]
    pub max_aggregation_iterations: Option<usize>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Verbose per-step tracing of `simplify`/`saturate` is hot-path and stays
/// off unless explicitly asked for, mirroring the teacher's own
/// `DATALOG_DEBUG` switch (here: `DYNA_DEBUG`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_inline_depth() -> usize {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level() }
    }
}

impl EngineConfig {
    /// Merges `engine.toml`, `engine.local.toml` (git-ignored overrides),
    /// and `DYNA_`-prefixed environment variables, in that order.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("engine.toml"))
            .merge(Toml::file("engine.local.toml"))
            .merge(Env::prefixed("DYNA_"))
            .join(figment::providers::Serialized::defaults(EngineConfig::default()))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DYNA_"))
            .join(figment::providers::Serialized::defaults(EngineConfig::default()))
            .extract()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_inline_depth: default_max_inline_depth(),
            max_aggregation_iterations: Some(1_000_000),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_inline_depth, 512);
        assert_eq!(cfg.max_aggregation_iterations, Some(1_000_000));
    }
}
