//! Query facade over discovery and aggregation, plus the background poller
//! that feeds the alert tracker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::alerts::{AlertDispatcher, AlertEvent, AlertTracker};
use crate::config::RuntimeSettings;
use crate::discovery::discover_session_files;
use crate::session::{SessionSummary, summarize_session_file};

#[derive(Debug, Clone)]
pub struct Monitor {
    projects_root: PathBuf,
    active_window: Duration,
    max_projects: usize,
    tracker: Arc<AlertTracker>,
}

impl Monitor {
    pub fn new(
        projects_root: impl Into<PathBuf>,
        settings: &RuntimeSettings,
        tracker: Arc<AlertTracker>,
    ) -> Self {
        Self {
            projects_root: projects_root.into(),
            active_window: settings.active_window,
            max_projects: settings.max_projects,
            tracker,
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    pub fn tracker(&self) -> &Arc<AlertTracker> {
        &self.tracker
    }

    /// Current usage of every active session, most recently written first.
    /// Touches only the filesystem; alert state is left alone.
    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        discover_session_files(&self.projects_root, self.active_window, self.max_projects)
            .into_iter()
            .filter_map(|file| summarize_session_file(&file.path, &file.project, file.modified))
            .collect()
    }

    pub fn reset_alerts(&self) {
        debug!("alert state cleared");
        self.tracker.reset();
    }

    /// One discovery → aggregation → threshold pass.
    pub fn poll_once(&self) -> (Vec<SessionSummary>, Vec<AlertEvent>) {
        let sessions = self.active_sessions();
        let mut events = Vec::new();
        for session in &sessions {
            for threshold in self.tracker.evaluate(session) {
                events.push(AlertEvent {
                    session: session.clone(),
                    threshold,
                });
            }
        }
        (sessions, events)
    }
}

/// Runs [`Monitor::poll_once`] on a fixed period on its own thread.
///
/// Cycles run back to back on that single thread, so they never overlap.
/// [`PollScheduler::stop`] wakes the wait immediately; a cycle already in
/// progress finishes first.
pub struct PollScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollScheduler {
    pub fn spawn(
        monitor: Monitor,
        dispatcher: Option<AlertDispatcher>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("context-poll".to_string())
            .spawn(move || {
                let mut next_tick = Instant::now() + interval;
                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let (sessions, events) = monitor.poll_once();
                    trace!(
                        sessions = sessions.len(),
                        alerts = events.len(),
                        "poll cycle complete"
                    );
                    if let Some(dispatcher) = &dispatcher {
                        for event in events {
                            dispatcher.dispatch(event);
                        }
                    }

                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now + interval;
                    }
                }
                debug!("poll scheduler stopped");
            })
            .context("failed to spawn poll scheduler thread")?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
