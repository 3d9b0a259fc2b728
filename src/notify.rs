//! Alert sinks: desktop notifications, sounds and log lines.
//!
//! All delivery is best-effort. Failures surface as [`NotifyError`] so the
//! dispatcher can log them; nothing here retries.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::alerts::{AlertEvent, AlertSink};
use crate::config::AlertConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed {
        program: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("desktop notifications are not supported on this platform")]
    Unsupported,

    #[error("failed to write terminal bell: {0}")]
    Bell(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    title: String,
    sound: bool,
    voice: bool,
}

impl DesktopNotifier {
    pub fn new(title: impl Into<String>, alerts: &AlertConfig) -> Self {
        Self {
            title: title.into(),
            sound: alerts.sound,
            voice: alerts.voice,
        }
    }

    /// Program used to show the notification on this platform.
    pub fn notification_program() -> Option<&'static str> {
        if cfg!(target_os = "macos") {
            Some("osascript")
        } else if cfg!(windows) {
            Some("powershell")
        } else if cfg!(unix) {
            Some("notify-send")
        } else {
            None
        }
    }
}

impl AlertSink for DesktopNotifier {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        platform::notify(self, event)
    }
}

/// Writes each alert to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        info!(
            project = %event.session.project_name,
            percentage = event.session.percentage,
            threshold = event.threshold,
            "{}",
            event.message()
        );
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn notify(&self, _event: &AlertEvent) -> Result<(), NotifyError> {
        let mut err = io::stderr();
        err.write_all(b"\x07")
            .and_then(|()| err.flush())
            .map_err(NotifyError::Bell)
    }
}

fn run_quiet(program: &'static str, args: &[&str]) -> Result<(), NotifyError> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| NotifyError::Spawn { program, source })?;
    if status.success() {
        Ok(())
    } else {
        Err(NotifyError::Failed { program, status })
    }
}

/// Runs every delivery step regardless of earlier failures and reports the
/// first one.
#[derive(Debug, Default)]
struct Attempts {
    first_error: Option<NotifyError>,
}

impl Attempts {
    fn record(&mut self, result: Result<(), NotifyError>) {
        let Err(err) = result else {
            return;
        };
        if self.first_error.is_none() {
            self.first_error = Some(err);
        } else {
            debug!(error = %err, "additional notification step failed");
        }
    }

    fn finish(self) -> Result<(), NotifyError> {
        self.first_error.map_or(Ok(()), Err)
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_quote(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg_attr(not(windows), allow(dead_code))]
fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg_attr(any(windows, target_os = "macos"), allow(dead_code))]
fn first_existing<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| Path::new(candidate).exists())
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;

    pub(super) fn notify(notifier: &DesktopNotifier, event: &AlertEvent) -> Result<(), NotifyError> {
        let mut attempts = Attempts::default();

        let script = format!(
            r#"display notification "{}" with title "{}""#,
            applescript_quote(&event.message()),
            applescript_quote(&notifier.title)
        );
        attempts.record(run_quiet("osascript", &["-e", script.as_str()]));

        if notifier.sound {
            let sound = if event.is_critical() {
                "/System/Library/Sounds/Sosumi.aiff"
            } else {
                "/System/Library/Sounds/Glass.aiff"
            };
            attempts.record(run_quiet("afplay", &[sound]));
        }

        if notifier.voice && event.is_critical() {
            attempts.record(run_quiet("say", &["Claude context almost full"]));
        }
        attempts.finish()
    }
}

#[cfg(windows)]
mod platform {
    use super::*;

    pub(super) fn notify(notifier: &DesktopNotifier, event: &AlertEvent) -> Result<(), NotifyError> {
        let mut attempts = Attempts::default();
        let script = toast_script(&notifier.title, &event.message());
        attempts.record(run_quiet(
            "powershell",
            &["-NoProfile", "-Command", script.as_str()],
        ));
        if notifier.sound {
            attempts.record(run_quiet(
                "powershell",
                &["-NoProfile", "-Command", "[console]::beep(800,300)"],
            ));
        }
        attempts.finish()
    }

    fn toast_script(title: &str, message: &str) -> String {
        format!(
            r#"[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
[Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null
$xml = New-Object Windows.Data.Xml.Dom.XmlDocument
$xml.LoadXml('<toast><visual><binding template="ToastText02"><text id="1">{}</text><text id="2">{}</text></binding></visual><audio src="ms-winsoundevent:Notification.Default"/></toast>')
$toast = [Windows.UI.Notifications.ToastNotification]::new($xml)
[Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{}').Show($toast)"#,
            powershell_literal(&xml_escape(title)),
            powershell_literal(&xml_escape(message)),
            powershell_literal(title)
        )
    }

    fn powershell_literal(input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
mod platform {
    use super::*;

    const SOUND_CANDIDATES: [&str; 3] = [
        "/usr/share/sounds/freedesktop/stereo/complete.oga",
        "/usr/share/sounds/gnome/default/alerts/glass.ogg",
        "/usr/share/sounds/ubuntu/stereo/message.ogg",
    ];

    pub(super) fn notify(notifier: &DesktopNotifier, event: &AlertEvent) -> Result<(), NotifyError> {
        let urgency = if event.is_critical() {
            "--urgency=critical"
        } else {
            "--urgency=normal"
        };
        let message = event.message();
        let mut attempts = Attempts::default();
        attempts.record(run_quiet(
            "notify-send",
            &[
                urgency,
                "--app-name=claude-context-watch",
                notifier.title.as_str(),
                message.as_str(),
            ],
        ));

        if notifier.sound
            && let Some(sound) = first_existing(&SOUND_CANDIDATES)
        {
            attempts.record(run_quiet("paplay", &[sound]));
        }
        attempts.finish()
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::*;

    pub(super) fn notify(_notifier: &DesktopNotifier, _event: &AlertEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Unsupported)
    }
}
