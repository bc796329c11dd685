use crate::errors::MonitorError;
use crate::logging::DEFAULT_JOURNAL_BUDGET_BYTES;
use crate::types::{RetryBudget, SessionErrorPolicy};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub type EnvMap = BTreeMap<String, String>;

pub const ENV_RECORDER: &str = "LGSVL_MONITOR_RECORDER";
pub const ENV_LOGIN_URL: &str = "LGSVL_MONITOR_LOGIN_URL";
pub const ENV_RUNNING_URL: &str = "LGSVL_MONITOR_RUNNING_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "LGSVL_MONITOR_POLL_INTERVAL_MS";
pub const ENV_STOP_ATTEMPTS: &str = "LGSVL_MONITOR_STOP_ATTEMPTS";
pub const ENV_STOP_DELAY_MS: &str = "LGSVL_MONITOR_STOP_DELAY_MS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "LGSVL_MONITOR_HTTP_TIMEOUT_SECS";
pub const ENV_SESSION_ERRORS: &str = "LGSVL_MONITOR_SESSION_ERRORS";
pub const ENV_EVENT_LOG: &str = "LGSVL_MONITOR_EVENT_LOG";
pub const ENV_EVENT_LOG_BUDGET_BYTES: &str = "LGSVL_MONITOR_EVENT_LOG_BUDGET_BYTES";

pub const DEFAULT_RECORDER: &str = "cyber_recorder";
pub const DEFAULT_LOGIN_URL: &str = "https://wise.svlsimulator.com/api/v1/auth/login";
pub const DEFAULT_RUNNING_URL: &str = "https://wise.svlsimulator.com/api/v1/simulations/running";
/// Room for two generations of worst-case journal lines.
pub const MIN_EVENT_LOG_BUDGET_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub recorder_process: String,
    pub login_url: String,
    pub running_url: String,
    pub poll_interval: Duration,
    pub stop_budget: RetryBudget,
    pub http_timeout: Duration,
    pub session_errors: SessionErrorPolicy,
    pub event_log: Option<PathBuf>,
    pub event_log_budget_bytes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            recorder_process: DEFAULT_RECORDER.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            running_url: DEFAULT_RUNNING_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            stop_budget: RetryBudget::default(),
            http_timeout: Duration::from_secs(30),
            session_errors: SessionErrorPolicy::TreatAsInactive,
            event_log: None,
            event_log_budget_bytes: DEFAULT_JOURNAL_BUDGET_BYTES,
        }
    }
}

pub fn load_config(env: &EnvMap) -> Result<MonitorConfig, MonitorError> {
    let mut cfg = MonitorConfig::default();
    apply_env_overrides(&mut cfg, env)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut MonitorConfig, env: &EnvMap) -> Result<(), MonitorError> {
    if let Some(value) = non_empty(env, ENV_RECORDER) {
        cfg.recorder_process = value.to_string();
    }
    if let Some(value) = non_empty(env, ENV_LOGIN_URL) {
        cfg.login_url = value.to_string();
    }
    if let Some(value) = non_empty(env, ENV_RUNNING_URL) {
        cfg.running_url = value.to_string();
    }
    if let Some(value) = parse_var::<u64>(env, ENV_POLL_INTERVAL_MS)? {
        cfg.poll_interval = Duration::from_millis(value);
    }
    if let Some(value) = parse_var::<u32>(env, ENV_STOP_ATTEMPTS)? {
        cfg.stop_budget.attempts = value;
    }
    if let Some(value) = parse_var::<u64>(env, ENV_STOP_DELAY_MS)? {
        cfg.stop_budget.delay = Duration::from_millis(value);
    }
    if let Some(value) = parse_var::<u64>(env, ENV_HTTP_TIMEOUT_SECS)? {
        cfg.http_timeout = Duration::from_secs(value);
    }
    if let Some(value) = non_empty(env, ENV_SESSION_ERRORS) {
        cfg.session_errors = SessionErrorPolicy::parse(value).ok_or_else(|| {
            MonitorError::InvalidConfig(format!(
                "{ENV_SESSION_ERRORS} must be treat-as-inactive or skip-tick, got {value:?}"
            ))
        })?;
    }
    if let Some(value) = non_empty(env, ENV_EVENT_LOG) {
        cfg.event_log = Some(PathBuf::from(value));
    }
    if let Some(value) = parse_var::<u64>(env, ENV_EVENT_LOG_BUDGET_BYTES)? {
        cfg.event_log_budget_bytes = value;
    }
    Ok(())
}

fn non_empty<'a>(env: &'a EnvMap, key: &str) -> Option<&'a str> {
    env.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(env: &EnvMap, key: &str) -> Result<Option<T>, MonitorError> {
    let Some(raw) = non_empty(env, key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| MonitorError::InvalidConfig(format!("{key} must be a number, got {raw:?}")))
}

fn validate_config(cfg: &MonitorConfig) -> Result<(), MonitorError> {
    if cfg.recorder_process.trim().is_empty() {
        return Err(MonitorError::InvalidConfig(
            "recorder process name must not be empty".to_string(),
        ));
    }

    for (name, url) in [("login url", &cfg.login_url), ("running url", &cfg.running_url)] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MonitorError::InvalidConfig(format!(
                "{name} must be an http(s) url, got {url:?}"
            )));
        }
    }

    if cfg.stop_budget.attempts == 0 {
        return Err(MonitorError::InvalidConfig(
            "stop attempts must be greater than zero".to_string(),
        ));
    }

    if cfg.poll_interval.is_zero() {
        return Err(MonitorError::InvalidConfig(
            "poll interval must be greater than zero".to_string(),
        ));
    }

    if cfg.event_log_budget_bytes < MIN_EVENT_LOG_BUDGET_BYTES {
        return Err(MonitorError::InvalidConfig(format!(
            "event log budget must be at least {MIN_EVENT_LOG_BUDGET_BYTES} bytes"
        )));
    }

    Ok(())
}
