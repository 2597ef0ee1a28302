/// Load test configuration: layered sources and the resolved run settings.
use crate::error::AppError;
use crate::prompts::PromptCatalog;
use crate::session::{DelayRange, Pacing, StopCondition};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "192.168.1.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL: &str = "Llama-3.2-3B-Instruct";
pub const DEFAULT_USERS: usize = 12;
pub const DEFAULT_DURATION_SECS: u64 = 300;
pub const DEFAULT_DELAY: &str = "3-8s";
pub const DEFAULT_ERROR_BACKOFF_SECS: f64 = 5.0;
pub const DEFAULT_STAGGER_MS: u64 = 200;
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 15;
pub const SINGLE_NODE_REPORT_INTERVAL_SECS: u64 = 10;
pub const MAX_REPORT_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_LOG_DIR: &str = "load_test_logs";

/// One layer of optional settings.
///
/// A TOML config file deserializes into this directly; the CLI builds one
/// from its flags. Layers are merged with [`PartialConfig::over`] and then
/// resolved into a [`LoadTestConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub node_id: Option<u32>,
    pub users: Option<usize>,
    /// Seconds.
    pub duration: Option<u64>,
    pub messages: Option<u64>,
    pub count_failures: Option<bool>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub delay: Option<String>,
    /// Seconds.
    pub error_backoff: Option<f64>,
    pub stagger_ms: Option<u64>,
    /// Seconds.
    pub report_interval: Option<u64>,
    /// Seconds.
    pub request_timeout: Option<u64>,
    /// Seconds.
    pub probe_timeout: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub prompt_file: Option<PathBuf>,
    pub prompts: Option<Vec<String>>,
    pub seed: Option<u64>,
}

impl PartialConfig {
    /// Read a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            )))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(content)?)
    }

    /// Merge two layers; values set in `self` win over `base`.
    pub fn over(self, base: PartialConfig) -> PartialConfig {
        PartialConfig {
            node_id: self.node_id.or(base.node_id),
            users: self.users.or(base.users),
            duration: self.duration.or(base.duration),
            messages: self.messages.or(base.messages),
            count_failures: self.count_failures.or(base.count_failures),
            server: self.server.or(base.server),
            port: self.port.or(base.port),
            base_url: self.base_url.or(base.base_url),
            model: self.model.or(base.model),
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            delay: self.delay.or(base.delay),
            error_backoff: self.error_backoff.or(base.error_backoff),
            stagger_ms: self.stagger_ms.or(base.stagger_ms),
            report_interval: self.report_interval.or(base.report_interval),
            request_timeout: self.request_timeout.or(base.request_timeout),
            probe_timeout: self.probe_timeout.or(base.probe_timeout),
            log_dir: self.log_dir.or(base.log_dir),
            // A prompt file and an inline list from the same layer are both
            // kept; the file wins during resolution.
            prompt_file: self.prompt_file.or(base.prompt_file),
            prompts: self.prompts.or(base.prompts),
            seed: self.seed.or(base.seed),
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(self) -> Result<LoadTestConfig, AppError> {
        let node_id = self.node_id.unwrap_or(0);

        let users = self.users.unwrap_or(DEFAULT_USERS);
        if users == 0 {
            return Err(AppError::Config("Number of users must be positive".to_string()));
        }

        let duration = self.duration.unwrap_or(DEFAULT_DURATION_SECS);
        if duration == 0 {
            return Err(AppError::Config("Duration must be positive".to_string()));
        }

        if self.messages == Some(0) {
            return Err(AppError::Config(
                "Message limit must be positive when given".to_string(),
            ));
        }

        let base_url = match self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "http://{}:{}",
                self.server.as_deref().unwrap_or(DEFAULT_SERVER),
                self.port.unwrap_or(DEFAULT_PORT)
            ),
        };
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Base URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if model.trim().is_empty() {
            return Err(AppError::Config("Model cannot be empty".to_string()));
        }

        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(AppError::Config(format!(
                "Temperature must be a non-negative number, got {}",
                temperature
            )));
        }

        let delay: DelayRange = self
            .delay
            .as_deref()
            .unwrap_or(DEFAULT_DELAY)
            .parse()
            .map_err(AppError::Config)?;

        let error_backoff = self.error_backoff.unwrap_or(DEFAULT_ERROR_BACKOFF_SECS);
        if !error_backoff.is_finite() || error_backoff < 0.0 {
            return Err(AppError::Config(format!(
                "Error backoff must be a non-negative number of seconds, got {}",
                error_backoff
            )));
        }
        let error_backoff = Duration::try_from_secs_f64(error_backoff).map_err(|e| {
            AppError::Config(format!("Invalid error backoff {}: {}", error_backoff, e))
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let probe_timeout = self.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);
        if request_timeout == 0 || probe_timeout == 0 {
            return Err(AppError::Config("Timeouts must be positive".to_string()));
        }

        let default_interval = if node_id == 0 {
            SINGLE_NODE_REPORT_INTERVAL_SECS
        } else {
            DEFAULT_REPORT_INTERVAL_SECS
        };
        let report_interval = self.report_interval.unwrap_or(default_interval);
        if report_interval > MAX_REPORT_INTERVAL_SECS {
            return Err(AppError::Config(format!(
                "Report interval must be at most {} seconds, got {}",
                MAX_REPORT_INTERVAL_SECS, report_interval
            )));
        }

        let prompts = match (self.prompt_file, self.prompts) {
            (Some(path), _) => PromptCatalog::from_file(path)?,
            (None, Some(list)) => PromptCatalog::from_prompts(list)?,
            (None, None) => PromptCatalog::builtin(),
        };

        Ok(LoadTestConfig {
            node_id,
            users,
            stop: StopCondition {
                duration: Some(Duration::from_secs(duration)),
                max_messages: self.messages,
                count_failures: self.count_failures.unwrap_or(false),
            },
            base_url,
            model,
            temperature,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            pacing: Pacing {
                delay,
                error_backoff,
            },
            stagger: Duration::from_millis(self.stagger_ms.unwrap_or(DEFAULT_STAGGER_MS)),
            report_interval: Duration::from_secs(report_interval),
            request_timeout: Duration::from_secs(request_timeout),
            probe_timeout: Duration::from_secs(probe_timeout),
            log_dir: self
                .log_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            prompts,
            seed: self.seed,
        })
    }
}

/// Fully resolved settings of one load test run.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// 0 for a single-node run.
    pub node_id: u32,
    pub users: usize,
    pub stop: StopCondition,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub pacing: Pacing,
    /// Delay between consecutive session starts.
    pub stagger: Duration,
    pub report_interval: Duration,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub log_dir: PathBuf,
    pub prompts: PromptCatalog,
    pub seed: Option<u64>,
}

impl LoadTestConfig {
    /// Globally unique id of the `local_index`-th user on this node.
    pub fn global_user_id(&self, local_index: usize) -> u64 {
        if self.node_id == 0 {
            local_index as u64
        } else {
            (self.node_id as u64 - 1) * self.users as u64 + local_index as u64
        }
    }
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            users: DEFAULT_USERS,
            stop: StopCondition::for_duration(Duration::from_secs(DEFAULT_DURATION_SECS)),
            base_url: format!("http://{}:{}", DEFAULT_SERVER, DEFAULT_PORT),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            pacing: Pacing::default(),
            stagger: Duration::from_millis(DEFAULT_STAGGER_MS),
            report_interval: Duration::from_secs(SINGLE_NODE_REPORT_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            prompts: PromptCatalog::builtin(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_layer_resolves_to_defaults() {
        let config = PartialConfig::default().resolve().unwrap();
        assert_eq!(config.node_id, 0);
        assert_eq!(config.users, 12);
        assert_eq!(config.base_url, "http://192.168.1.1:8000");
        assert_eq!(config.stop.duration, Some(Duration::from_secs(300)));
        assert_eq!(config.stop.max_messages, None);
        assert!(!config.stop.count_failures);
        assert_eq!(config.pacing, Pacing::default());
        assert_eq!(config.stagger, Duration::from_millis(200));
        assert_eq!(config.report_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.log_dir, PathBuf::from("load_test_logs"));
        assert_eq!(config.prompts.len(), 15);
    }

    #[test]
    fn distributed_runs_report_less_often() {
        let config = PartialConfig {
            node_id: Some(2),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(config.report_interval, Duration::from_secs(15));
    }

    #[test]
    fn cli_layer_overrides_file_layer() {
        let file = PartialConfig::from_toml(
            r#"
            users = 4
            duration = 60
            server = "10.0.0.5"
            port = 9000
            delay = "1-2s"
            prompts = ["one", "two"]
            "#,
        )
        .unwrap();
        let cli = PartialConfig {
            users: Some(8),
            ..Default::default()
        };

        let config = cli.over(file).resolve().unwrap();
        assert_eq!(config.users, 8);
        assert_eq!(config.stop.duration, Some(Duration::from_secs(60)));
        assert_eq!(config.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.pacing.delay.max, Duration::from_secs(2));
        assert_eq!(config.prompts.len(), 2);
    }

    #[test]
    fn base_url_overrides_server_and_port() {
        let config = PartialConfig {
            server: Some("ignored".into()),
            base_url: Some("http://localhost:8080/".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn rejects_invalid_settings() {
        let cases = [
            PartialConfig { users: Some(0), ..Default::default() },
            PartialConfig { duration: Some(0), ..Default::default() },
            PartialConfig { messages: Some(0), ..Default::default() },
            PartialConfig { delay: Some("9-1s".into()), ..Default::default() },
            PartialConfig { temperature: Some(f64::NAN), ..Default::default() },
            PartialConfig { base_url: Some("ftp://host".into()), ..Default::default() },
            PartialConfig { prompts: Some(vec!["  ".into()]), ..Default::default() },
            PartialConfig { request_timeout: Some(0), ..Default::default() },
            PartialConfig { error_backoff: Some(-1.0), ..Default::default() },
            PartialConfig { error_backoff: Some(1e20), ..Default::default() },
            PartialConfig { report_interval: Some(u64::MAX), ..Default::default() },
            PartialConfig { report_interval: Some(MAX_REPORT_INTERVAL_SECS + 1), ..Default::default() },
        ];
        for case in cases {
            let err = case.clone().resolve();
            assert!(matches!(err, Err(AppError::Config(_))), "{:?} should be rejected", case);
        }
    }

    #[test]
    fn unknown_keys_in_file_are_rejected() {
        let err = PartialConfig::from_toml("userz = 3").unwrap_err();
        assert!(matches!(err, AppError::Toml(_)));
    }

    #[test]
    fn prompt_file_wins_over_inline_prompts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from file\n\nsecond").unwrap();

        let config = PartialConfig {
            prompt_file: Some(file.path().to_path_buf()),
            prompts: Some(vec!["inline".into()]),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(config.prompts.len(), 2);
    }

    #[test]
    fn global_ids_partition_by_node() {
        let mut config = LoadTestConfig {
            users: 12,
            ..Default::default()
        };
        assert_eq!(config.global_user_id(3), 3);

        config.node_id = 1;
        assert_eq!(config.global_user_id(0), 0);
        config.node_id = 3;
        assert_eq!(config.global_user_id(0), 24);
        assert_eq!(config.global_user_id(11), 35);
    }
}
