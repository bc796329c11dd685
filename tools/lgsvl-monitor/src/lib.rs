pub mod config;
pub mod errors;
pub mod executor;
pub mod fsm;
pub mod log_retention;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod runtime;
pub mod session;
pub mod shutdown;
pub mod types;

use clap::{error::ErrorKind, CommandFactory, Parser};
use config::{load_config, EnvMap, MonitorConfig};
use errors::MonitorError;
use logging::EventJournal;
use monitor::Monitor;
use runtime::{MonitorRuntime, Terminal};
use serde_json::json;
use shutdown::ShutdownSignal;
use types::Credentials;

pub const PASSWORD_PROMPT: &str = "Password: ";

#[derive(Debug, Clone, Parser)]
#[command(name = "lgsvl-monitor")]
#[command(
    about = "Monitor the state of the LG-SVL simulator and stop the cyber recorder when a simulation ends"
)]
pub struct Cli {
    /// LG-SVL username
    #[arg(short, long)]
    pub username: String,
    /// LG-SVL password (prompted if not specified)
    #[arg(short, long)]
    pub password: Option<String>,
}

pub fn run() -> Result<i32, MonitorError> {
    logging::init_tracing();
    let args = std::env::args_os().collect::<Vec<_>>();
    let Some(cli) = parse_cli(&args)? else {
        return Ok(0);
    };
    let env = env_to_map(&std::env::vars_os().collect::<Vec<_>>());
    let cfg = load_config(&env)?;
    let runtime = MonitorRuntime::production(&cfg)?;
    let shutdown = ShutdownSignal::new();
    shutdown.install()?;
    run_session(&cli, &cfg, &runtime, &shutdown)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &EnvMap,
    runtime: &MonitorRuntime,
    shutdown: &ShutdownSignal,
) -> Result<i32, MonitorError> {
    let Some(cli) = parse_cli(args)? else {
        return Ok(0);
    };
    let cfg = load_config(env)?;
    run_session(&cli, &cfg, runtime, shutdown)
}

/// `None` when clap already printed help or version output.
pub fn parse_cli(args: &[std::ffi::OsString]) -> Result<Option<Cli>, MonitorError> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                Ok(None)
            }
            _ => Err(MonitorError::Cli(error.to_string())),
        },
    }
}

/// Logs in and monitors until shutdown. Login failure never reaches the loop.
pub fn run_session(
    cli: &Cli,
    cfg: &MonitorConfig,
    runtime: &MonitorRuntime,
    shutdown: &ShutdownSignal,
) -> Result<i32, MonitorError> {
    let journal = EventJournal::from_config(cfg);
    let credentials = resolve_credentials(cli, runtime.terminal.as_ref())?;

    if let Err(error) = session::login(runtime.sessions.as_ref(), &credentials) {
        journal.record(
            "error",
            "login",
            json!({ "username": credentials.username, "error": error.to_string() }),
        );
        return Err(error);
    }
    journal.record(
        "info",
        "login",
        json!({ "username": credentials.username, "recorder": cfg.recorder_process }),
    );
    runtime.terminal.write_line("Successfully logged in")?;

    let mut monitor = Monitor::new(cfg, runtime, &journal);
    let summary = monitor.run(shutdown)?;
    tracing::info!(
        ticks = summary.ticks,
        phase = summary.final_phase.as_str(),
        "monitor stopped"
    );
    Ok(0)
}

pub fn resolve_credentials(
    cli: &Cli,
    terminal: &dyn Terminal,
) -> Result<Credentials, MonitorError> {
    let password = match &cli.password {
        Some(password) => password.clone(),
        None => terminal.read_secret(PASSWORD_PROMPT)?,
    };
    Ok(Credentials {
        username: cli.username.clone(),
        password,
    })
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}

pub fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
