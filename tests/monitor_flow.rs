use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use claude_context_watch::alerts::{AlertDispatcher, AlertEvent, AlertSink, AlertTracker};
use claude_context_watch::config::RuntimeSettings;
use claude_context_watch::monitor::{Monitor, PollScheduler};
use claude_context_watch::notify::NotifyError;
use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, u8)>>,
}

impl RecordingSink {
    fn recorded(&self) -> Vec<(String, u8)> {
        self.events.lock().expect("lock").clone()
    }
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("lock")
            .push((event.session.project_name.clone(), event.threshold));
        Ok(())
    }
}

fn usage_line(cwd: &str, input: u64, output: u64) -> String {
    format!(
        r#"{{"type":"assistant","cwd":"{cwd}","message":{{"usage":{{"input_tokens":{input},"output_tokens":{output},"cache_read_input_tokens":0,"cache_creation_input_tokens":0}}}}}}"#
    )
}

fn write_session(root: &Path, project: &str, name: &str, lines: &[String], age: Duration) {
    let dir = root.join(project);
    std::fs::create_dir_all(&dir).expect("project dir");
    let path = dir.join(name);
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body).expect("write session");
    let modified = SystemTime::now().checked_sub(age).expect("mtime");
    set_file_mtime(&path, FileTime::from_system_time(modified)).expect("set mtime");
}

fn monitor_for(root: &Path) -> Monitor {
    Monitor::new(
        root,
        &RuntimeSettings::default(),
        Arc::new(AlertTracker::default()),
    )
}

#[test]
fn sessions_are_reported_newest_first_one_per_project() {
    let tmp = TempDir::new().expect("temp dir");
    let root = tmp.path();
    write_session(
        root,
        "-work-api",
        "old.jsonl",
        &[usage_line("/work/api", 1_000, 10)],
        Duration::from_secs(600),
    );
    write_session(
        root,
        "-work-api",
        "new.jsonl",
        &[
            "garbage line".to_string(),
            usage_line("/work/api", 1_000, 100),
            usage_line("/work/api", 2_000, 50),
        ],
        Duration::from_secs(60),
    );
    write_session(
        root,
        "-work-web",
        "web.jsonl",
        &[usage_line("", 150_000, 0)],
        Duration::from_secs(5),
    );
    write_session(
        root,
        "-work-stale",
        "stale.jsonl",
        &[usage_line("/work/stale", 1_000, 0)],
        Duration::from_secs(61 * 60),
    );

    let sessions = monitor_for(root).active_sessions();
    assert_eq!(sessions.len(), 2);

    assert_eq!(sessions[0].project_name, "-work-web");
    assert_eq!(sessions[0].percentage, 75);

    assert_eq!(sessions[1].id, "new.jsonl");
    assert_eq!(sessions[1].project_name, "api");
    assert_eq!(sessions[1].project_path, "-work-api");
    assert_eq!(sessions[1].used_tokens, 2_150);
    assert_eq!(sessions[1].free_tokens, 200_000 - 2_150);
}

#[test]
fn discovery_caps_at_ten_projects() {
    let tmp = TempDir::new().expect("temp dir");
    for idx in 0..15u64 {
        write_session(
            tmp.path(),
            &format!("project-{idx:02}"),
            "s.jsonl",
            &[usage_line(&format!("/work/p{idx:02}"), 1_000, 0)],
            Duration::from_secs(30 * (idx + 1)),
        );
    }

    let sessions = monitor_for(tmp.path()).active_sessions();
    let names: Vec<String> = sessions.into_iter().map(|s| s.project_name).collect();
    let expected: Vec<String> = (0..10).map(|idx| format!("p{idx:02}")).collect();
    assert_eq!(names, expected);
}

#[test]
fn scheduler_alerts_once_per_threshold_until_reset() {
    let tmp = TempDir::new().expect("temp dir");
    write_session(
        tmp.path(),
        "-work-api",
        "s.jsonl",
        &[usage_line("/work/api", 160_000, 0)],
        Duration::from_secs(10),
    );

    let monitor = monitor_for(tmp.path());
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = AlertDispatcher::new(vec![sink.clone() as Arc<dyn AlertSink>]);
    let mut scheduler =
        PollScheduler::spawn(monitor.clone(), Some(dispatcher), Duration::from_millis(20))
            .expect("spawn scheduler");

    thread::sleep(Duration::from_millis(400));
    scheduler.stop();

    assert_eq!(sink.recorded(), vec![("api".to_string(), 75)]);

    let (_, repeat) = monitor.poll_once();
    assert!(repeat.is_empty());

    monitor.reset_alerts();
    let (_, rearmed) = monitor.poll_once();
    assert_eq!(rearmed.len(), 1);
    assert_eq!(rearmed[0].threshold, 75);
}

#[test]
fn growing_session_escalates_through_thresholds() {
    let tmp = TempDir::new().expect("temp dir");
    let monitor = monitor_for(tmp.path());
    let write = |input: u64| {
        write_session(
            tmp.path(),
            "-work-api",
            "s.jsonl",
            &[usage_line("/work/api", input, 0)],
            Duration::from_secs(1),
        );
    };

    write(140_000);
    assert!(monitor.poll_once().1.is_empty());

    write(154_000);
    let second: Vec<u8> = monitor.poll_once().1.iter().map(|e| e.threshold).collect();
    assert_eq!(second, vec![75]);

    write(182_000);
    let third: Vec<u8> = monitor.poll_once().1.iter().map(|e| e.threshold).collect();
    assert_eq!(third, vec![90]);
}
