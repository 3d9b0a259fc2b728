use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;
use walkdir::WalkDir;

pub const SESSION_LOG_EXTENSION: &str = "jsonl";
const SUBAGENT_PREFIX: &str = "agent-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Name of the project directory that holds the file.
    pub project: String,
}

/// Scan `projects_root/<project>/<session>.jsonl` for recently written
/// sessions, newest first, one per project, at most `max_projects`.
///
/// Unreadable directories and entries are skipped rather than reported.
pub fn discover_session_files(
    projects_root: &Path,
    active_window: Duration,
    max_projects: usize,
) -> Vec<SessionFile> {
    let cutoff = SystemTime::now()
        .checked_sub(active_window)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut candidates = Vec::new();
    for entry in WalkDir::new(projects_root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "skipping unreadable projects entry");
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_session_log_name(name) {
            continue;
        }

        let Some(project) = entry
            .path()
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
        else {
            continue;
        };
        let Some(modified) = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
        else {
            continue;
        };

        if modified > cutoff {
            candidates.push(SessionFile {
                path: entry.into_path(),
                modified,
                project,
            });
        }
    }

    select_latest_per_project(candidates, max_projects)
}

pub fn is_session_log_name(name: &str) -> bool {
    name.ends_with(&format!(".{SESSION_LOG_EXTENSION}")) && !name.starts_with(SUBAGENT_PREFIX)
}

fn select_latest_per_project(
    mut candidates: Vec<SessionFile>,
    max_projects: usize,
) -> Vec<SessionFile> {
    candidates.sort_by_key(|candidate| Reverse(candidate.modified));

    let mut seen: HashSet<String> = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.project.clone()));
    candidates.truncate(max_projects);
    candidates
}
