use lgsvl_monitor::config::MonitorConfig;
use lgsvl_monitor::errors::MonitorError;
use lgsvl_monitor::log_retention::rotated_path;
use lgsvl_monitor::logging::EventJournal;
use lgsvl_monitor::monitor::{Monitor, TickOutcome, RECORDER_LOST_WARNING};
use lgsvl_monitor::runtime::{
    Clock, FakeClock, FakeProcessTable, FakeSessionApi, FakeTerminal, MonitorRuntime,
};
use lgsvl_monitor::shutdown::ShutdownSignal;
use lgsvl_monitor::types::{Action, Phase, SessionErrorPolicy};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RECORDER_PID: u32 = 4242;

struct Harness {
    processes: FakeProcessTable,
    sessions: FakeSessionApi,
    terminal: FakeTerminal,
    clock: FakeClock,
    runtime: MonitorRuntime,
}

fn harness() -> Harness {
    let processes = FakeProcessTable::default();
    processes.spawn(1, "systemd", 0);
    let sessions = FakeSessionApi::default();
    let terminal = FakeTerminal::new(true);
    let clock = FakeClock::default();
    let runtime = MonitorRuntime {
        clock: Arc::new(clock.clone()),
        processes: Arc::new(processes.clone()),
        sessions: Arc::new(sessions.clone()),
        terminal: Arc::new(terminal.clone()),
    };
    Harness {
        processes,
        sessions,
        terminal,
        clock,
        runtime,
    }
}

fn drive_to_running(monitor: &mut Monitor<'_>, h: &Harness) {
    h.processes.spawn(RECORDER_PID, "cyber_recorder", 0);
    for _ in 0..2 {
        h.sessions.push_sessions(true);
        monitor.tick().expect("tick");
    }
    assert_eq!(monitor.phase(), Phase::Running);
}

#[test]
fn session_end_with_lingering_signal_converges_to_idle() {
    let h = harness();
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    let mut phases = vec![monitor.phase()];

    h.processes.spawn(RECORDER_PID, "cyber_recorder", 0);
    for _ in 0..4 {
        h.sessions.push_sessions(true);
        monitor.tick().expect("tick");
        phases.push(monitor.phase());
    }

    h.sessions.push_sessions(false);
    let outcome = monitor.tick().expect("stop tick");
    phases.push(monitor.phase());
    assert!(matches!(
        outcome,
        TickOutcome::Stepped { step, .. } if step.action == Action::StopRecorder
    ));
    assert!(h.processes.pids().iter().all(|pid| *pid != RECORDER_PID));

    // A stale "still running" answer from the API keeps the monitor in Stopping.
    h.sessions.push_sessions(true);
    monitor.tick().expect("stale tick");
    phases.push(monitor.phase());

    h.sessions.push_sessions(false);
    monitor.tick().expect("settle tick");
    phases.push(monitor.phase());

    assert_eq!(
        phases,
        vec![
            Phase::Idle,
            Phase::Waiting,
            Phase::Running,
            Phase::Running,
            Phase::Running,
            Phase::Stopping,
            Phase::Stopping,
            Phase::Idle,
        ]
    );
    assert_eq!(h.processes.kills(), vec![RECORDER_PID]);
    let stop_lines = h
        .terminal
        .written_lines()
        .iter()
        .filter(|line| line.as_str() == "Stopping cyber recorder")
        .count();
    assert_eq!(stop_lines, 2);
    assert_eq!(h.terminal.statuses().last().map(String::as_str), Some("Idle...    "));
    assert!(h
        .clock
        .pauses()
        .iter()
        .all(|d| *d == Duration::from_millis(200)));
}

#[test]
fn recorder_exit_during_simulation_warns_and_waits() {
    let h = harness();
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    drive_to_running(&mut monitor, &h);

    h.processes.exit(RECORDER_PID);
    h.sessions.push_sessions(true);
    let outcome = monitor.tick().expect("tick");

    assert_eq!(monitor.phase(), Phase::Waiting);
    assert!(matches!(
        outcome,
        TickOutcome::Stepped { step, .. } if step.action == Action::None
    ));
    assert_eq!(h.terminal.written_lines(), vec![RECORDER_LOST_WARNING.to_string()]);
    assert!(h.processes.kills().is_empty());
}

#[test]
fn session_query_failure_reads_as_inactive_by_default() {
    let h = harness();
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    drive_to_running(&mut monitor, &h);

    // Literal behaviour: a network blip looks like the simulation ending.
    h.sessions
        .push_running(Err(MonitorError::Http("connection reset".to_string())));
    monitor.tick().expect("tick");

    assert_eq!(monitor.phase(), Phase::Stopping);
    assert_eq!(h.processes.kills(), vec![RECORDER_PID]);
}

#[test]
fn long_session_outage_keeps_the_journal_within_budget() {
    let h = harness();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.jsonl");
    let cfg = MonitorConfig::default();
    let mut journal = EventJournal::new(&path);
    journal.budget_bytes = 4096;
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);

    // Every query fails: the fake has no replies queued.
    for _ in 0..1000 {
        monitor.tick().expect("tick");
    }

    assert_eq!(monitor.phase(), Phase::Idle);
    assert_eq!(h.sessions.running_queries(), 1000);
    let live = std::fs::metadata(&path).expect("live").len();
    let rotated = std::fs::metadata(rotated_path(&path)).expect("rotated").len();
    assert!(live + rotated <= 4096, "{live} + {rotated}");
}

#[test]
fn skip_tick_policy_holds_phase_on_query_failure() {
    let h = harness();
    let cfg = MonitorConfig {
        session_errors: SessionErrorPolicy::SkipTick,
        ..MonitorConfig::default()
    };
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    drive_to_running(&mut monitor, &h);

    h.sessions
        .push_running(Err(MonitorError::Http("connection reset".to_string())));
    h.sessions.push_running_body("<html>bad gateway</html>");
    assert_eq!(monitor.tick().expect("tick"), TickOutcome::Inconclusive);
    assert_eq!(monitor.tick().expect("tick"), TickOutcome::Inconclusive);

    assert_eq!(monitor.phase(), Phase::Running);
    assert!(h.processes.kills().is_empty());

    h.sessions.push_sessions(true);
    monitor.tick().expect("tick");
    assert_eq!(monitor.phase(), Phase::Running);
}

#[test]
fn recorder_that_refuses_to_die_is_fatal() {
    let h = harness();
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    h.processes.spawn(RECORDER_PID, "cyber_recorder", u32::MAX);
    for _ in 0..2 {
        h.sessions.push_sessions(true);
        monitor.tick().expect("tick");
    }

    h.sessions.push_sessions(false);
    let err = monitor.tick().expect_err("budget exhausted");
    assert!(matches!(err, MonitorError::RecorderStopFailed { attempts: 10 }));
    assert_eq!(h.processes.kills().len(), 10);
}

#[test]
fn non_tty_output_uses_structured_lines() {
    let processes = FakeProcessTable::default();
    let sessions = FakeSessionApi::default();
    let terminal = FakeTerminal::new(false);
    let runtime = MonitorRuntime {
        clock: Arc::new(FakeClock::default()),
        processes: Arc::new(processes),
        sessions: Arc::new(sessions.clone()),
        terminal: Arc::new(terminal.clone()),
    };
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &runtime, &journal);

    sessions.push_sessions(true);
    monitor.tick().expect("tick");

    assert!(terminal.statuses().is_empty());
    assert_eq!(
        terminal.written_lines(),
        vec!["phase=waiting message=Waiting...".to_string()]
    );
}

struct ShutdownAfterSleeps {
    inner: FakeClock,
    shutdown: ShutdownSignal,
    remaining: Mutex<u32>,
}

impl Clock for ShutdownAfterSleeps {
    fn pause(&self, duration: Duration) -> Result<(), MonitorError> {
        self.inner.pause(duration)?;
        let mut remaining = self.remaining.lock().expect("remaining lock");
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.shutdown.request();
        }
        Ok(())
    }
}

#[test]
fn run_drains_the_current_tick_and_journals_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal_path = dir.path().join("events.jsonl");
    let shutdown = ShutdownSignal::new();
    let clock = FakeClock::default();
    let sessions = FakeSessionApi::default();
    let terminal = FakeTerminal::new(true);
    let runtime = MonitorRuntime {
        clock: Arc::new(ShutdownAfterSleeps {
            inner: clock.clone(),
            shutdown: shutdown.clone(),
            remaining: Mutex::new(3),
        }),
        processes: Arc::new(FakeProcessTable::with_process(RECORDER_PID, "cyber_recorder")),
        sessions: Arc::new(sessions.clone()),
        terminal: Arc::new(terminal.clone()),
    };
    for _ in 0..3 {
        sessions.push_sessions(true);
    }
    let cfg = MonitorConfig::default();
    let journal = EventJournal::new(&journal_path);
    let mut monitor = Monitor::new(&cfg, &runtime, &journal);

    let summary = monitor.run(&shutdown).expect("graceful stop");

    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.final_phase, Phase::Running);
    assert_eq!(sessions.running_queries(), 3);
    assert_eq!(clock.pauses(), vec![Duration::from_secs(1); 3]);
    assert_eq!(terminal.clears(), 1);

    let events = std::fs::read_to_string(&journal_path)
        .expect("journal")
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json"))
        .collect::<Vec<_>>();
    let kinds = events
        .iter()
        .map(|event| event["event_type"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["transition", "transition", "shutdown"]);
    assert_eq!(events[1]["payload"]["to"], "running");
    assert_eq!(events[2]["payload"]["ticks"], 3);
}

#[test]
fn run_returns_immediately_when_shutdown_already_requested() {
    let h = harness();
    let cfg = MonitorConfig::default();
    let journal = EventJournal::disabled();
    let mut monitor = Monitor::new(&cfg, &h.runtime, &journal);
    let shutdown = ShutdownSignal::new();
    shutdown.request();

    let summary = monitor.run(&shutdown).expect("stop");
    assert_eq!(summary.ticks, 0);
    assert_eq!(summary.final_phase, Phase::Idle);
    assert_eq!(h.sessions.running_queries(), 0);
    assert!(h.clock.pauses().is_empty());
}
