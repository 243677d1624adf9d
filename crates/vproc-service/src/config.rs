//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use vproc_models::EncodingConfig;

/// Service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Base directory for logical result names
    pub result_dir: PathBuf,
    /// Engine delegations allowed to run in parallel
    pub max_concurrent_jobs: usize,
    /// Per-delegation timeout, `None` waits indefinitely
    pub engine_timeout: Option<Duration>,
    /// Bridge build calls also start processing
    pub auto_process: bool,
    /// Codec settings for merge and encode
    pub encoding: EncodingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            result_dir: std::env::temp_dir().join("vproc"),
            max_concurrent_jobs: 2,
            engine_timeout: None,
            auto_process: false,
            encoding: EncodingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back
    /// to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut encoding = defaults.encoding.clone();
        if let Some(codec) = lookup("VPROC_VIDEO_CODEC").filter(|c| !c.trim().is_empty()) {
            encoding = encoding.with_codec(codec.trim());
        }
        if let Some(crf) = lookup("VPROC_CRF").and_then(|s| s.trim().parse::<u8>().ok()) {
            encoding = encoding.with_crf(crf);
        }

        Self {
            result_dir: lookup("VPROC_RESULT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.result_dir),
            max_concurrent_jobs: lookup("VPROC_MAX_CONCURRENT_JOBS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            engine_timeout: lookup("VPROC_ENGINE_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),
            auto_process: lookup("VPROC_AUTO_PROCESS")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.auto_process),
            encoding,
        }
    }

    pub fn with_result_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.result_dir = dir.into();
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.max_concurrent_jobs, 2);
        assert!(config.engine_timeout.is_none());
        assert!(!config.auto_process);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("VPROC_RESULT_DIR", "/data/results"),
            ("VPROC_MAX_CONCURRENT_JOBS", "4"),
            ("VPROC_ENGINE_TIMEOUT_SECS", "90"),
            ("VPROC_AUTO_PROCESS", "true"),
            ("VPROC_VIDEO_CODEC", "libx265"),
            ("VPROC_CRF", "28"),
        ]));

        assert_eq!(config.result_dir, PathBuf::from("/data/results"));
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.engine_timeout, Some(Duration::from_secs(90)));
        assert!(config.auto_process);
        assert_eq!(config.encoding.codec, "libx265");
        assert_eq!(config.encoding.crf, 28);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("VPROC_MAX_CONCURRENT_JOBS", "0"),
            ("VPROC_ENGINE_TIMEOUT_SECS", "soon"),
            ("VPROC_CRF", "high"),
        ]));

        assert_eq!(config.max_concurrent_jobs, 2);
        assert!(config.engine_timeout.is_none());
        assert_eq!(config.encoding.crf, 20);
    }
}
