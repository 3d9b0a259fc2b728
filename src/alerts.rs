//! Once-per-session threshold alerts.
//!
//! [`AlertTracker`] is the only state that outlives a poll cycle. Each
//! `(session id, threshold)` pair fires at most once until [`AlertTracker::reset`];
//! a dip below a threshold does not re-arm it. Delivery happens on the
//! [`AlertDispatcher`] worker so a slow sink never holds the tracker lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::notify::NotifyError;
use crate::session::SessionSummary;

pub const DEFAULT_THRESHOLDS: [u8; 2] = [75, 90];
pub const CRITICAL_THRESHOLD: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub session: SessionSummary,
    pub threshold: u8,
}

impl AlertEvent {
    pub fn is_critical(&self) -> bool {
        self.threshold >= CRITICAL_THRESHOLD
    }

    pub fn message(&self) -> String {
        if self.is_critical() {
            format!("⚠️ {} - Context almost full!", self.session.project_name)
        } else {
            format!("{} - Save context soon!", self.session.project_name)
        }
    }
}

/// Receiver of alert events, e.g. a desktop notifier.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

#[derive(Debug)]
pub struct AlertTracker {
    thresholds: Vec<u8>,
    fired: Mutex<HashMap<String, BTreeSet<u8>>>,
}

impl AlertTracker {
    /// Thresholds are evaluated in ascending order; duplicates are ignored.
    pub fn new(thresholds: &[u8]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self {
            thresholds,
            fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    /// Mark and return every threshold this session newly reaches.
    pub fn evaluate(&self, session: &SessionSummary) -> Vec<u8> {
        let mut fired = self.lock();
        let marked = fired.entry(session.id.clone()).or_default();
        self.thresholds
            .iter()
            .copied()
            .filter(|threshold| session.percentage >= *threshold && marked.insert(*threshold))
            .collect()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn tracked_sessions(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeSet<u8>>> {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new(&DEFAULT_THRESHOLDS)
    }
}

/// Fire-and-forget delivery of alert events to a set of sinks.
pub struct AlertDispatcher {
    sender: Option<Sender<AlertEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (sender, receiver) = mpsc::channel::<AlertEvent>();
        let worker = thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || {
                for event in receiver {
                    deliver(&sinks, &event);
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "failed to start alert dispatch thread; alerts disabled");
                None
            }
        };
        Self {
            sender: worker.as_ref().map(|_| sender),
            worker,
        }
    }

    pub fn dispatch(&self, event: AlertEvent) {
        info!(
            session = %event.session.id,
            project = %event.session.project_name,
            percentage = event.session.percentage,
            threshold = event.threshold,
            "context threshold crossed"
        );
        if let Some(sender) = &self.sender
            && sender.send(event).is_err()
        {
            warn!("alert dispatch thread is gone; dropping alert");
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn deliver(sinks: &[Arc<dyn AlertSink>], event: &AlertEvent) {
    for sink in sinks {
        if let Err(err) = sink.notify(event) {
            warn!(sink = sink.name(), error = %err, "alert sink failed");
        }
    }
}
