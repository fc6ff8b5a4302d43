use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use bacillus_core::engine::EngineConfig;
use bacillus_core::runlog::IndicatorStyle;

/// Invalid configuration value. Fatal at startup.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {var} ({value:?}): {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running a local instance; job
/// descriptors are not part of this struct (they come from the command line).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `9990`). Also names the run log.
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory under which job workspaces are created.
    pub job_home: PathBuf,
    /// Root of the per-instance artifact directories.
    pub artifacts_dir: PathBuf,
    /// Tail length of `/runlog` (0 shows the whole log).
    pub run_log_tail_lines: usize,
    pub running_jobs_limit: usize,
    /// Start with an empty run log instead of appending.
    pub fresh_run_log: bool,
    pub attach_stdout: bool,
    pub show_stages_on_finished: bool,
    pub live_stages: bool,
    pub indicator_style: IndicatorStyle,
    /// Require HTTP Basic auth on every route except `/health`.
    pub basic_auth: bool,
    pub auth_user: String,
    pub auth_password: String,
    /// Disables `/shutdown` and `/rudeshutdown`.
    pub demo_mode: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `9990`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:9990` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `JOB_HOME`                | `workdir`               |
    /// | `ARTIFACTS_DIR`           | `artifacts`             |
    /// | `RUN_LOG_TAIL_LINES`      | `30`                    |
    /// | `RUNNING_JOBS_LIMIT`      | `8`                     |
    /// | `FRESH_RUN_LOG`           | `false`                 |
    /// | `ATTACH_STDOUT`           | `false`                 |
    /// | `SHOW_STAGES_ON_FINISHED` | `false`                 |
    /// | `LIVE_STAGES`             | `true`                  |
    /// | `INDICATOR_STYLE`         | `both`                  |
    /// | `BASIC_AUTH`              | `true`                  |
    /// | `AUTH_USER`               | `bacuser`               |
    /// | `AUTH_PASSWORD`           | `gramnegative`          |
    /// | `DEMO_MODE`               | `false`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "http://localhost:9990")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let running_jobs_limit: usize = parse("RUNNING_JOBS_LIMIT", &var("RUNNING_JOBS_LIMIT", "8"))?;
        if running_jobs_limit == 0 {
            return Err(ConfigError {
                var: "RUNNING_JOBS_LIMIT",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: parse("PORT", &var("PORT", "9990"))?,
            cors_origins,
            request_timeout_secs: parse("REQUEST_TIMEOUT_SECS", &var("REQUEST_TIMEOUT_SECS", "30"))?,
            job_home: PathBuf::from(var("JOB_HOME", "workdir")),
            artifacts_dir: PathBuf::from(var("ARTIFACTS_DIR", "artifacts")),
            run_log_tail_lines: parse("RUN_LOG_TAIL_LINES", &var("RUN_LOG_TAIL_LINES", "30"))?,
            running_jobs_limit,
            fresh_run_log: parse_bool("FRESH_RUN_LOG", &var("FRESH_RUN_LOG", "false"))?,
            attach_stdout: parse_bool("ATTACH_STDOUT", &var("ATTACH_STDOUT", "false"))?,
            show_stages_on_finished: parse_bool(
                "SHOW_STAGES_ON_FINISHED",
                &var("SHOW_STAGES_ON_FINISHED", "false"),
            )?,
            live_stages: parse_bool("LIVE_STAGES", &var("LIVE_STAGES", "true"))?,
            indicator_style: parse("INDICATOR_STYLE", &var("INDICATOR_STYLE", "both"))?,
            basic_auth: parse_bool("BASIC_AUTH", &var("BASIC_AUTH", "true"))?,
            auth_user: var("AUTH_USER", "bacuser"),
            auth_password: var("AUTH_PASSWORD", "gramnegative"),
            demo_mode: parse_bool("DEMO_MODE", &var("DEMO_MODE", "false"))?,
        })
    }

    /// `host:port` as given in the configuration.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The run log lives in the working directory, one per listening port.
    pub fn run_log_path(&self) -> PathBuf {
        PathBuf::from(format!("run{}.log", self.port))
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(&self.job_home, &self.artifacts_dir);
        engine.job_limit = self.running_jobs_limit;
        engine.attach_stdout = self.attach_stdout;
        engine.show_stages_on_finished = self.show_stages_on_finished;
        engine.live_stages = self.live_stages;
        engine.indicator_style = self.indicator_style;
        engine
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 9990);
        assert_eq!(config.run_log_path(), PathBuf::from("run9990.log"));
        assert_eq!(config.running_jobs_limit, 8);
        assert_eq!(config.run_log_tail_lines, 30);
        assert_eq!(config.indicator_style, IndicatorStyle::Both);
        assert!(config.basic_auth);
        assert!(config.live_stages);
        assert!(!config.demo_mode);
        assert_eq!(config.auth_user, "bacuser");
    }

    #[test]
    fn overrides_flow_into_engine_config() {
        let config = load(&[
            ("PORT", "8081"),
            ("RUNNING_JOBS_LIMIT", "2"),
            ("INDICATOR_STYLE", "colour"),
            ("LIVE_STAGES", "off"),
            ("CORS_ORIGINS", "http://a, http://b"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:8081");
        assert_eq!(config.cors_origins, ["http://a", "http://b"]);

        let engine = config.engine_config();
        assert_eq!(engine.job_limit, 2);
        assert_eq!(engine.indicator_style, IndicatorStyle::Colour);
        assert!(!engine.live_stages);
        assert_eq!(engine.layout.job_home, PathBuf::from("workdir"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("PORT", "ninety")]).unwrap_err();
        assert_eq!(err.var, "PORT");
        assert!(load(&[("BASIC_AUTH", "maybe")]).is_err());
        assert!(load(&[("INDICATOR_STYLE", "rainbow")]).is_err());
        assert!(load(&[("RUNNING_JOBS_LIMIT", "0")]).is_err());
    }
}
