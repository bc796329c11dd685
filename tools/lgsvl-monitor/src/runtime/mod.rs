use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::types::Credentials;
use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::QueueableCommand;
use std::collections::VecDeque;
use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking pause between polls and between kill attempts.
pub trait Clock: Send + Sync {
    fn pause(&self, duration: Duration) -> Result<(), MonitorError>;
}

pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> Vec<ProcessEntry>;
    fn terminate(&self, pid: u32) -> Result<(), MonitorError>;
}

pub trait SessionApi: Send + Sync {
    fn login(&self, credentials: &Credentials) -> Result<HttpReply, MonitorError>;
    fn running_sessions(&self) -> Result<HttpReply, MonitorError>;
}

pub trait Terminal: Send + Sync {
    fn stdout_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), MonitorError>;
    fn draw_status(&self, label: &str) -> Result<(), MonitorError>;
    fn clear_status(&self) -> Result<(), MonitorError>;
    fn read_secret(&self, prompt: &str) -> Result<String, MonitorError>;
}

fn io_error(error: std::io::Error) -> MonitorError {
    MonitorError::Io(error.to_string())
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn pause(&self, duration: Duration) -> Result<(), MonitorError> {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
        Ok(())
    }
}

pub struct ProductionProcessTable {
    system: Mutex<System>,
}

impl ProductionProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProductionProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProductionProcessTable {
    // Processes the monitor cannot inspect are omitted by sysinfo rather than
    // failing the whole refresh.
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect()
    }

    fn terminate(&self, pid: u32) -> Result<(), MonitorError> {
        let system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(process) = system.process(Pid::from_u32(pid)) else {
            return Ok(());
        };
        if process.kill() {
            Ok(())
        } else {
            Err(MonitorError::Process(format!("failed to signal pid {pid}")))
        }
    }
}

pub struct ProductionSessionApi {
    client: reqwest::blocking::Client,
    login_url: String,
    running_url: String,
}

impl ProductionSessionApi {
    pub fn new(cfg: &MonitorConfig) -> Result<Self, MonitorError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| MonitorError::Http(e.to_string()))?;
        Ok(Self {
            client,
            login_url: cfg.login_url.clone(),
            running_url: cfg.running_url.clone(),
        })
    }

    fn reply(response: reqwest::blocking::Response) -> Result<HttpReply, MonitorError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| MonitorError::Http(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

impl SessionApi for ProductionSessionApi {
    fn login(&self, credentials: &Credentials) -> Result<HttpReply, MonitorError> {
        let form = [
            ("email", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        let response = self
            .client
            .post(&self.login_url)
            .form(&form)
            .send()
            .map_err(|e| MonitorError::Http(e.to_string()))?;
        Self::reply(response)
    }

    fn running_sessions(&self) -> Result<HttpReply, MonitorError> {
        let response = self
            .client
            .get(&self.running_url)
            .send()
            .map_err(|e| MonitorError::Http(e.to_string()))?;
        Self::reply(response)
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdout_is_tty(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn write_line(&self, line: &str) -> Result<(), MonitorError> {
        let mut out = std::io::stdout();
        if self.stdout_is_tty() {
            out.queue(MoveToColumn(0))
                .and_then(|out| out.queue(Clear(ClearType::CurrentLine)))
                .map_err(io_error)?;
        }
        writeln!(out, "{line}").map_err(io_error)?;
        out.flush().map_err(io_error)
    }

    fn draw_status(&self, label: &str) -> Result<(), MonitorError> {
        let mut out = std::io::stdout();
        out.queue(MoveToColumn(0))
            .and_then(|out| out.queue(Clear(ClearType::CurrentLine)))
            .and_then(|out| out.queue(Print(label)))
            .map_err(io_error)?;
        out.flush().map_err(io_error)
    }

    fn clear_status(&self) -> Result<(), MonitorError> {
        if !self.stdout_is_tty() {
            return Ok(());
        }
        let mut out = std::io::stdout();
        out.queue(MoveToColumn(0))
            .and_then(|out| out.queue(Clear(ClearType::CurrentLine)))
            .map_err(io_error)?;
        out.flush().map_err(io_error)
    }

    fn read_secret(&self, prompt: &str) -> Result<String, MonitorError> {
        let mut err = std::io::stderr();
        write!(err, "{prompt}").map_err(io_error)?;
        err.flush().map_err(io_error)?;

        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            let mut line = String::new();
            stdin.read_line(&mut line).map_err(io_error)?;
            return Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string());
        }

        terminal::enable_raw_mode().map_err(io_error)?;
        let secret = read_hidden_line();
        let restored = terminal::disable_raw_mode().map_err(io_error);
        writeln!(err).map_err(io_error)?;
        restored?;
        secret
    }
}

fn read_hidden_line() -> Result<String, MonitorError> {
    let mut secret = String::new();
    loop {
        match event::read().map_err(io_error)? {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) => {
                if kind == KeyEventKind::Release {
                    continue;
                }
                match code {
                    KeyCode::Enter => return Ok(secret),
                    KeyCode::Backspace => {
                        secret.pop();
                    }
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        return Err(MonitorError::Cli("password entry aborted".to_string()));
                    }
                    KeyCode::Char(ch) => secret.push(ch),
                    _ => {}
                }
            }
            Event::Paste(text) => secret.push_str(&text),
            _ => {}
        }
    }
}

pub struct MonitorRuntime {
    pub clock: Arc<dyn Clock>,
    pub processes: Arc<dyn ProcessTable>,
    pub sessions: Arc<dyn SessionApi>,
    pub terminal: Arc<dyn Terminal>,
}

impl MonitorRuntime {
    pub fn production(cfg: &MonitorConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            clock: Arc::new(ProductionClock),
            processes: Arc::new(ProductionProcessTable::new()),
            sessions: Arc::new(ProductionSessionApi::new(cfg)?),
            terminal: Arc::new(ProductionTerminal),
        })
    }
}

/// Records every requested pause instead of blocking.
#[derive(Default, Clone)]
pub struct FakeClock {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().expect("pauses lock").clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.pauses().into_iter().sum()
    }
}

impl Clock for FakeClock {
    fn pause(&self, duration: Duration) -> Result<(), MonitorError> {
        self.pauses.lock().expect("pauses lock").push(duration);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FakeProcess {
    entry: ProcessEntry,
    survives_kills: u32,
}

/// Process table double. Each entry disappears once it has absorbed its
/// configured number of kills.
#[derive(Default, Clone)]
pub struct FakeProcessTable {
    processes: Arc<Mutex<Vec<FakeProcess>>>,
    kills: Arc<Mutex<Vec<u32>>>,
    snapshots: Arc<Mutex<usize>>,
    refuse_signals: Arc<Mutex<bool>>,
}

impl FakeProcessTable {
    pub fn with_process(pid: u32, name: &str) -> Self {
        let table = Self::default();
        table.spawn(pid, name, 0);
        table
    }

    pub fn spawn(&self, pid: u32, name: &str, survives_kills: u32) {
        self.processes
            .lock()
            .expect("processes lock")
            .push(FakeProcess {
                entry: ProcessEntry {
                    pid,
                    name: name.to_string(),
                },
                survives_kills,
            });
    }

    pub fn exit(&self, pid: u32) {
        self.processes
            .lock()
            .expect("processes lock")
            .retain(|process| process.entry.pid != pid);
    }

    pub fn set_refuse_signals(&self, refuse: bool) {
        *self.refuse_signals.lock().expect("refuse lock") = refuse;
    }

    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().expect("kills lock").clone()
    }

    pub fn snapshot_count(&self) -> usize {
        *self.snapshots.lock().expect("snapshots lock")
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes
            .lock()
            .expect("processes lock")
            .iter()
            .map(|process| process.entry.pid)
            .collect()
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        *self.snapshots.lock().expect("snapshots lock") += 1;
        self.processes
            .lock()
            .expect("processes lock")
            .iter()
            .map(|process| process.entry.clone())
            .collect()
    }

    fn terminate(&self, pid: u32) -> Result<(), MonitorError> {
        self.kills.lock().expect("kills lock").push(pid);
        if *self.refuse_signals.lock().expect("refuse lock") {
            return Err(MonitorError::Process(format!("failed to signal pid {pid}")));
        }
        let mut processes = self.processes.lock().expect("processes lock");
        if let Some(index) = processes.iter().position(|p| p.entry.pid == pid) {
            if processes[index].survives_kills == 0 {
                processes.remove(index);
            } else {
                processes[index].survives_kills -= 1;
            }
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeSessionApi {
    login_replies: Arc<Mutex<VecDeque<Result<HttpReply, MonitorError>>>>,
    running_replies: Arc<Mutex<VecDeque<Result<HttpReply, MonitorError>>>>,
    logins: Arc<Mutex<Vec<Credentials>>>,
    running_queries: Arc<Mutex<usize>>,
}

impl FakeSessionApi {
    pub fn push_login(&self, reply: Result<HttpReply, MonitorError>) {
        self.login_replies
            .lock()
            .expect("login lock")
            .push_back(reply);
    }

    pub fn push_login_status(&self, status: u16) {
        self.push_login(Ok(HttpReply {
            status,
            body: String::new(),
        }));
    }

    pub fn push_running(&self, reply: Result<HttpReply, MonitorError>) {
        self.running_replies
            .lock()
            .expect("running lock")
            .push_back(reply);
    }

    pub fn push_running_body(&self, body: &str) {
        self.push_running(Ok(HttpReply {
            status: 200,
            body: body.to_string(),
        }));
    }

    pub fn push_sessions(&self, active: bool) {
        if active {
            self.push_running_body(r#"[{"id":"sim-1","status":"Running"}]"#);
        } else {
            self.push_running_body("[]");
        }
    }

    pub fn logins(&self) -> Vec<Credentials> {
        self.logins.lock().expect("logins lock").clone()
    }

    pub fn running_queries(&self) -> usize {
        *self.running_queries.lock().expect("queries lock")
    }
}

impl SessionApi for FakeSessionApi {
    fn login(&self, credentials: &Credentials) -> Result<HttpReply, MonitorError> {
        self.logins
            .lock()
            .expect("logins lock")
            .push(credentials.clone());
        self.login_replies
            .lock()
            .expect("login lock")
            .pop_front()
            .unwrap_or_else(|| Err(MonitorError::Http("no fake login reply queued".to_string())))
    }

    fn running_sessions(&self) -> Result<HttpReply, MonitorError> {
        *self.running_queries.lock().expect("queries lock") += 1;
        self.running_replies
            .lock()
            .expect("running lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(MonitorError::Http(
                    "no fake running reply queued".to_string(),
                ))
            })
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
    statuses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    secrets: Arc<Mutex<VecDeque<String>>>,
    clears: Arc<Mutex<usize>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn with_secret(self, secret: &str) -> Self {
        self.secrets
            .lock()
            .expect("secrets lock")
            .push_back(secret.to_string());
        self
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().expect("statuses lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn clears(&self) -> usize {
        *self.clears.lock().expect("clears lock")
    }
}

impl Terminal for FakeTerminal {
    fn stdout_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), MonitorError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn draw_status(&self, label: &str) -> Result<(), MonitorError> {
        self.statuses
            .lock()
            .expect("statuses lock")
            .push(label.to_string());
        Ok(())
    }

    fn clear_status(&self) -> Result<(), MonitorError> {
        *self.clears.lock().expect("clears lock") += 1;
        Ok(())
    }

    fn read_secret(&self, prompt: &str) -> Result<String, MonitorError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.secrets
            .lock()
            .expect("secrets lock")
            .pop_front()
            .ok_or_else(|| MonitorError::Io("no fake secret queued".to_string()))
    }
}
