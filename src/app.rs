use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use tracing::info;

use crate::alerts::{AlertDispatcher, AlertSink, AlertTracker};
use crate::config::{self, RuntimeSettings, WatchConfig};
use crate::monitor::{Monitor, PollScheduler};
use crate::notify::{DesktopNotifier, LogSink, TerminalBell};
use crate::process_guard::{self, LockStatus};
use crate::session::SessionSummary;
use crate::ui::{self, RenderData};
use crate::util::format_tokens;

const RESET_NOTE_TTL: Duration = Duration::from_secs(2);

pub fn run(config: WatchConfig, runtime: RuntimeSettings) -> Result<()> {
    let stop = install_stop_signal()?;
    let tracker = Arc::new(AlertTracker::new(&config.alerts.thresholds));
    let monitor = Monitor::new(config::projects_path(), &runtime, Arc::clone(&tracker));
    let interactive = io::stdout().is_terminal();

    let dispatcher = config
        .alerts
        .enabled
        .then(|| AlertDispatcher::new(alert_sinks(&config, interactive)));
    let mut scheduler = PollScheduler::spawn(monitor.clone(), dispatcher, runtime.poll_interval)?;

    let result = if interactive {
        run_foreground_tui(&config, &runtime, &monitor, &stop)
    } else {
        run_headless(&monitor, &stop)
    };

    scheduler.stop();
    result
}

fn alert_sinks(config: &WatchConfig, interactive: bool) -> Vec<Arc<dyn AlertSink>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![
        Arc::new(LogSink),
        Arc::new(DesktopNotifier::new(
            config.display.title.clone(),
            &config.alerts,
        )),
    ];
    if interactive && config.alerts.sound {
        sinks.push(Arc::new(TerminalBell));
    }
    sinks
}

fn run_foreground_tui(
    config: &WatchConfig,
    runtime: &RuntimeSettings,
    monitor: &Monitor,
    stop: &AtomicBool,
) -> Result<()> {
    let started = Instant::now();
    let mut last_tick = Instant::now() - runtime.ui_refresh;
    let mut sessions: Vec<SessionSummary> = Vec::new();
    let mut last_render_signature = String::new();
    let mut force_redraw = true;
    let mut reset_at: Option<Instant> = None;

    ui::enter_terminal()?;

    let mut run = || -> Result<()> {
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            let reset_note_live = reset_at.is_some_and(|at| at.elapsed() < RESET_NOTE_TTL);
            if last_tick.elapsed() >= runtime.ui_refresh || force_redraw {
                if last_tick.elapsed() >= runtime.ui_refresh {
                    sessions = monitor.active_sessions();
                    last_tick = Instant::now();
                }

                let render = RenderData {
                    running_for: started.elapsed(),
                    alerts_enabled: config.alerts.enabled,
                    thresholds: monitor.tracker().thresholds(),
                    poll_interval_secs: runtime.poll_interval.as_secs(),
                    active_minutes: runtime.active_window.as_secs() / 60,
                    alerted_sessions: monitor.tracker().tracked_sessions(),
                    status_note: reset_note_live.then_some("alerts reset"),
                    sessions: &sessions,
                };
                let signature = ui::frame_signature(&render);
                if force_redraw || signature != last_render_signature {
                    ui::draw(&render)?;
                    last_render_signature = signature;
                    force_redraw = false;
                }
            }

            if event::poll(Duration::from_millis(100))? {
                match event::read()? {
                    Event::Key(key) => {
                        if key.code == KeyCode::Char('q')
                            || (key.code == KeyCode::Char('c')
                                && key.modifiers.contains(KeyModifiers::CONTROL))
                        {
                            break;
                        }
                        if key.code == KeyCode::Char('r') {
                            monitor.reset_alerts();
                            reset_at = Some(Instant::now());
                            force_redraw = true;
                        }
                    }
                    Event::Resize(_, _) => {
                        force_redraw = true;
                    }
                    _ => {}
                }
            }

            if reset_at.is_some_and(|at| at.elapsed() >= RESET_NOTE_TTL) {
                reset_at = None;
                force_redraw = true;
            }
        }
        Ok(())
    };

    let run_result = run();
    let _ = ui::leave_terminal();
    run_result
}

fn run_headless(monitor: &Monitor, stop: &AtomicBool) -> Result<()> {
    info!(
        root = %monitor.projects_root().display(),
        "no interactive terminal detected; watching in headless mode (Ctrl+C to stop)"
    );
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

pub fn print_status(runtime: &RuntimeSettings, json: bool) -> Result<()> {
    let monitor = Monitor::new(
        config::projects_path(),
        runtime,
        Arc::new(AlertTracker::default()),
    );
    let sessions = monitor.active_sessions();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    let lock = process_guard::watcher_lock_status()?;
    println!("claude-context-watch status");
    match lock {
        LockStatus::Free => println!("running: false"),
        LockStatus::Held { pid } => {
            println!("running: true");
            if let Some(pid) = pid {
                println!("pid: {pid}");
            }
        }
    }
    println!("config: {}", config::config_path().display());
    println!("projects_dir: {}", monitor.projects_root().display());
    println!("active_sessions: {}", sessions.len());
    for session in &sessions {
        print_session_summary(session);
    }
    Ok(())
}

fn print_session_summary(session: &SessionSummary) {
    println!(
        "  - {} ({}%, {}) used {} | free {} | updated {}",
        session.project_name,
        session.percentage,
        session.level().label(),
        format_tokens(session.used_tokens),
        format_tokens(session.free_tokens),
        session.last_updated
    );
    println!("    session: {} in {}", session.id, session.project_path);
}

pub fn doctor(config: &WatchConfig) -> Result<u8> {
    let mut issues = 0u8;
    let projects = config::projects_path();

    println!("claude-context-watch doctor");
    println!("config_path: {}", config::config_path().display());
    println!("projects_dir: {}", projects.display());

    if directory_readable(&projects) {
        println!("[OK] Claude projects directory is readable.");
    } else {
        issues += 1;
        println!("[WARN] Claude projects directory is missing or unreadable.");
    }

    if !config.alerts.enabled {
        println!("[INFO] Alerts are disabled in config.");
    } else {
        match DesktopNotifier::notification_program() {
            Some(program) if command_available(program) => {
                println!("[OK] {program} available for desktop notifications.");
            }
            Some(program) => {
                issues += 1;
                println!("[WARN] {program} not found in PATH; desktop alerts will fail.");
            }
            None => {
                issues += 1;
                println!("[WARN] Desktop notifications are not supported on this platform.");
            }
        }
    }

    if issues == 0 {
        println!("Doctor: healthy");
        Ok(0)
    } else {
        println!("Doctor: {issues} issue(s) found");
        Ok(1)
    }
}

fn directory_readable(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok()
}

fn command_available(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

fn install_stop_signal() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;
    Ok(stop)
}
