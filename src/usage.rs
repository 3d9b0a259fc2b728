//! Decoding of single session-log lines.
//!
//! Only the handful of fields needed for context accounting are read; every
//! other key in a record is ignored. A line that is not a JSON object, or whose
//! known fields carry the wrong shape, decodes to `None` and is skipped by the
//! caller.

use serde::Deserialize;

/// Record type whose usage block counts toward context occupancy.
pub const ASSISTANT_RECORD_TYPE: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    /// Tokens currently occupying the context window on the input side.
    pub fn context_input_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }
}

/// Counters may be absent or `null`; both read as zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
}

impl From<RawUsage> for TokenUsage {
    fn from(raw: RawUsage) -> Self {
        Self {
            input_tokens: raw.input_tokens.unwrap_or(0),
            output_tokens: raw.output_tokens.unwrap_or(0),
            cache_read_input_tokens: raw.cache_read_input_tokens.unwrap_or(0),
            cache_creation_input_tokens: raw.cache_creation_input_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawMessage {
    usage: Option<RawUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    cwd: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsageRecord {
    pub kind: String,
    pub cwd: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl UsageRecord {
    /// Usage that should be folded into the session totals, if any.
    pub fn assistant_usage(&self) -> Option<&TokenUsage> {
        if self.kind == ASSISTANT_RECORD_TYPE {
            self.usage.as_ref()
        } else {
            None
        }
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.cwd.as_deref().filter(|cwd| !cwd.is_empty())
    }
}

pub fn parse_record(line: &[u8]) -> Option<UsageRecord> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    let raw = serde_json::from_slice::<RawRecord>(trimmed).ok()?;
    Some(UsageRecord {
        kind: raw.kind.unwrap_or_default(),
        cwd: raw.cwd,
        usage: raw
            .message
            .and_then(|message| message.usage)
            .map(TokenUsage::from),
    })
}
