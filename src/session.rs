use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::usage::{TokenUsage, parse_record};

/// Fixed context window every session is measured against.
pub const CONTEXT_BUDGET_TOKENS: u64 = 200_000;

const READ_BUFFER_BYTES: usize = 1024 * 1024;
const CURRENT_DIR_MARKER: &str = ".";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub project_name: String,
    pub project_path: String,
    pub used_tokens: u64,
    pub free_tokens: u64,
    pub percentage: u8,
    pub last_updated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UsageLevel {
    Good,
    Warning,
    Danger,
    Critical,
}

impl UsageLevel {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            90.. => Self::Critical,
            75..=89 => Self::Danger,
            60..=74 => Self::Warning,
            _ => Self::Good,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Critical => "critical",
        }
    }
}

impl SessionSummary {
    pub fn level(&self) -> UsageLevel {
        UsageLevel::from_percentage(self.percentage)
    }
}

/// `(percentage, free_tokens)` for a token count against the fixed budget.
pub fn context_usage(used_tokens: u64) -> (u8, u64) {
    let percentage = (u128::from(used_tokens) * 100 / u128::from(CONTEXT_BUDGET_TOKENS)).min(100);
    let free_tokens = CONTEXT_BUDGET_TOKENS.saturating_sub(used_tokens);
    (percentage as u8, free_tokens)
}

/// Running reduction over the records of one session file.
///
/// Output tokens are work product and accumulate over the whole session. The
/// input side (fresh input plus both cache counters) describes what currently
/// sits in the window, so only the latest assistant turn counts.
#[derive(Debug, Default)]
pub struct SessionAccumulator {
    total_output_tokens: u64,
    last_usage: Option<TokenUsage>,
    cwd: Option<String>,
}

impl SessionAccumulator {
    pub fn apply_line(&mut self, line: &[u8]) {
        let Some(record) = parse_record(line) else {
            return;
        };

        if self.cwd.is_none()
            && let Some(cwd) = record.working_dir()
        {
            self.cwd = Some(cwd.to_string());
        }

        if let Some(usage) = record.assistant_usage() {
            self.total_output_tokens = self.total_output_tokens.saturating_add(usage.output_tokens);
            self.last_usage = Some(*usage);
        }
    }

    pub fn used_tokens(&self) -> Option<u64> {
        let last = self.last_usage.as_ref()?;
        Some(
            self.total_output_tokens
                .saturating_add(last.context_input_tokens()),
        )
    }

    pub fn build_summary(
        &self,
        session_id: &str,
        project_dir: &str,
        last_updated: String,
    ) -> Option<SessionSummary> {
        let used_tokens = self.used_tokens()?;
        let (percentage, free_tokens) = context_usage(used_tokens);

        Some(SessionSummary {
            id: session_id.to_string(),
            project_name: project_display_name(self.cwd.as_deref(), project_dir),
            project_path: project_dir.to_string(),
            used_tokens,
            free_tokens,
            percentage,
            last_updated,
        })
    }
}

/// Reduce one session log to a summary. Unreadable files and files without a
/// single assistant usage record yield `None`.
pub fn summarize_session_file(
    path: &Path,
    project_dir: &str,
    modified: SystemTime,
) -> Option<SessionSummary> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "skipping unreadable session file");
            return None;
        }
    };

    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
    let mut accumulator = SessionAccumulator::default();
    let mut line = Vec::with_capacity(4096);
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => accumulator.apply_line(&line),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "session file read failed");
                return None;
            }
        }
    }

    let session_id = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown-session");
    let summary = accumulator.build_summary(session_id, project_dir, format_clock(modified));
    if summary.is_none() {
        trace!(path = %path.display(), "no assistant usage in session file");
    }
    summary
}

fn project_display_name(cwd: Option<&str>, project_dir: &str) -> String {
    cwd.map(Path::new)
        .and_then(|path| path.file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != CURRENT_DIR_MARKER)
        .map(ToString::to_string)
        .unwrap_or_else(|| project_dir.to_string())
}

pub fn format_clock(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summarize(content: &str) -> Option<SessionSummary> {
        let tmp = TempDir::new().expect("temp dir");
        let file_path = tmp.path().join("abc-123.jsonl");
        std::fs::write(&file_path, content).expect("write jsonl");
        summarize_session_file(&file_path, "-home-dev-app", SystemTime::now())
    }

    fn assistant_line(input: u64, output: u64, cache_read: u64, cache_creation: u64) -> String {
        format!(
            r#"{{"type":"assistant","cwd":"/home/dev/app","message":{{"usage":{{"input_tokens":{input},"output_tokens":{output},"cache_read_input_tokens":{cache_read},"cache_creation_input_tokens":{cache_creation}}}}}}}"#
        )
    }

    #[test]
    fn output_accumulates_while_input_tracks_latest_turn() {
        let content = format!(
            "{}\n{}\n",
            assistant_line(1000, 100, 0, 0),
            assistant_line(2000, 50, 0, 0)
        );
        let summary = summarize(&content).expect("summary");

        assert_eq!(summary.used_tokens, 2150);
        assert_eq!(summary.free_tokens, CONTEXT_BUDGET_TOKENS - 2150);
        assert_eq!(summary.percentage, 1);
        assert_eq!(summary.id, "abc-123.jsonl");
        assert_eq!(summary.project_name, "app");
        assert_eq!(summary.project_path, "-home-dev-app");
    }

    #[test]
    fn null_cache_counters_keep_the_latest_turn() {
        let content = format!(
            "{}\n{}\n",
            assistant_line(1000, 100, 0, 0),
            r#"{"type":"assistant","cwd":"/home/dev/app","message":{"usage":{"input_tokens":150000,"output_tokens":50,"cache_read_input_tokens":null,"cache_creation_input_tokens":null}}}"#
        );
        let summary = summarize(&content).expect("summary");

        assert_eq!(summary.used_tokens, 150_150);
        assert_eq!(summary.percentage, 75);
    }

    #[test]
    fn cache_counters_count_toward_current_input() {
        let content = format!(
            "{}\n{}\n",
            assistant_line(10, 500, 90_000, 4_000),
            assistant_line(20, 500, 120_000, 9_980)
        );
        let summary = summarize(&content).expect("summary");
        assert_eq!(summary.used_tokens, 1000 + 20 + 120_000 + 9_980);
        assert_eq!(summary.percentage, 65);
    }

    #[test]
    fn malformed_line_does_not_abort_aggregation() {
        let content = format!(
            "{{\"type\":\"assistant\",\"message\":\n{}\n{}\n",
            assistant_line(1000, 100, 0, 0),
            assistant_line(2000, 50, 0, 0)
        );
        let summary = summarize(&content).expect("summary");
        assert_eq!(summary.used_tokens, 2150);
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let tmp = TempDir::new().expect("temp dir");
        let file_path = tmp.path().join("bytes.jsonl");
        let mut bytes = vec![0xff, 0xfe, b'{', b'\n'];
        bytes.extend_from_slice(assistant_line(10, 5, 0, 0).as_bytes());
        std::fs::write(&file_path, bytes).expect("write");

        let summary =
            summarize_session_file(&file_path, "proj", SystemTime::now()).expect("summary");
        assert_eq!(summary.used_tokens, 15);
    }

    #[test]
    fn no_usage_records_yield_no_summary() {
        assert!(summarize("").is_none());
        assert!(summarize("not json\nstill not json\n").is_none());
        assert!(
            summarize(r#"{"type":"user","cwd":"/a","message":{"usage":{"input_tokens":5}}}"#)
                .is_none()
        );
    }

    #[test]
    fn missing_file_yields_no_summary() {
        let tmp = TempDir::new().expect("temp dir");
        let missing = tmp.path().join("gone.jsonl");
        assert!(summarize_session_file(&missing, "proj", SystemTime::now()).is_none());
    }

    #[test]
    fn usage_over_budget_clamps_percentage_and_free_tokens() {
        let summary = summarize(&assistant_line(150_000, 60_000, 10_000, 0)).expect("summary");
        assert_eq!(summary.used_tokens, 220_000);
        assert_eq!(summary.percentage, 100);
        assert_eq!(summary.free_tokens, 0);
    }

    #[test]
    fn percentage_and_free_tokens_hold_their_bounds() {
        for used in [
            0,
            1,
            1_999,
            2_000,
            149_999,
            150_000,
            199_999,
            200_000,
            200_001,
            u64::MAX,
        ] {
            let (percentage, free) = context_usage(used);
            assert!(percentage <= 100);
            assert_eq!(free, CONTEXT_BUDGET_TOKENS.saturating_sub(used));
            if used >= CONTEXT_BUDGET_TOKENS {
                assert_eq!(percentage, 100);
            } else {
                assert_eq!(u64::from(percentage), used * 100 / CONTEXT_BUDGET_TOKENS);
            }
        }
    }

    #[test]
    fn first_non_empty_cwd_names_the_project() {
        let content = concat!(
            r#"{"type":"user","cwd":""}"#,
            "\n",
            r#"{"type":"user","cwd":"/work/first-repo"}"#,
            "\n",
            r#"{"type":"assistant","cwd":"/work/second-repo","message":{"usage":{"input_tokens":1,"output_tokens":1}}}"#,
            "\n"
        );
        let summary = summarize(content).expect("summary");
        assert_eq!(summary.project_name, "first-repo");
    }

    #[test]
    fn empty_cwd_falls_back_to_project_directory() {
        let content = concat!(
            r#"{"type":"assistant","cwd":"","message":{"usage":{"input_tokens":1,"output_tokens":1}}}"#,
            "\n"
        );
        let summary = summarize(content).expect("summary");
        assert_eq!(summary.project_name, "-home-dev-app");
    }

    #[test]
    fn current_dir_marker_falls_back_to_project_directory() {
        assert_eq!(project_display_name(Some("."), "proj-dir"), "proj-dir");
        assert_eq!(project_display_name(Some("/"), "proj-dir"), "proj-dir");
        assert_eq!(project_display_name(Some("/srv/api/"), "proj-dir"), "api");
        assert_eq!(project_display_name(None, "proj-dir"), "proj-dir");
    }

    #[test]
    fn long_lines_are_read_without_truncation() {
        let padding = "x".repeat(11 * 1024 * 1024);
        let content = format!(
            r#"{{"type":"assistant","cwd":"/work/big","padding":"{padding}","message":{{"usage":{{"input_tokens":7,"output_tokens":3}}}}}}"#
        );
        let summary = summarize(&content).expect("summary");
        assert_eq!(summary.used_tokens, 10);
        assert_eq!(summary.project_name, "big");
    }

    #[test]
    fn usage_levels_follow_display_bands() {
        assert_eq!(UsageLevel::from_percentage(0), UsageLevel::Good);
        assert_eq!(UsageLevel::from_percentage(59), UsageLevel::Good);
        assert_eq!(UsageLevel::from_percentage(60), UsageLevel::Warning);
        assert_eq!(UsageLevel::from_percentage(75), UsageLevel::Danger);
        assert_eq!(UsageLevel::from_percentage(89), UsageLevel::Danger);
        assert_eq!(UsageLevel::from_percentage(90), UsageLevel::Critical);
        assert_eq!(UsageLevel::from_percentage(100), UsageLevel::Critical);
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let summary = SessionSummary {
            id: "s.jsonl".to_string(),
            project_name: "app".to_string(),
            project_path: "-app".to_string(),
            used_tokens: 10,
            free_tokens: 199_990,
            percentage: 0,
            last_updated: "12:00:00".to_string(),
        };
        let value = serde_json::to_value(&summary).expect("json");
        assert_eq!(value["projectName"], "app");
        assert_eq!(value["usedTokens"], 10);
        assert_eq!(value["lastUpdated"], "12:00:00");
    }
}
