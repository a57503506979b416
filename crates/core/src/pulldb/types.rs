//! Pull list data types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::normalize;

// ============================================================================
// Pull
// ============================================================================

/// A periodical issue the user wants to acquire.
///
/// The pull list service is loose about encodings: ids arrive as numbers or
/// decimal strings (and under both `id` and `identifier`), flags as booleans
/// or `"True"`/`"False"`, weights as numbers or numeric strings. Decoding
/// goes through [`RawPull`] to accept all of them; encoding always writes
/// the canonical types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawPull")]
pub struct Pull {
    /// Stable, globally unique identifier.
    pub id: u64,
    /// Title of the issue. Missing names are tolerated and skipped by matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fetch priority; lower weights are processed first.
    pub weight: f64,
    /// Delivery sequence this pull belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,
    pub read: bool,
    /// Whether the pull has been moved from "new" into the user's list.
    pub pulled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<DateTime<Utc>>,
}

impl Pull {
    /// Create an unread, independent pull (useful for tests and fixtures).
    pub fn new(id: u64, name: impl Into<String>, weight: f64) -> Self {
        Self {
            id,
            name: Some(name.into()),
            weight,
            stream_id: None,
            volume_id: None,
            read: false,
            pulled: true,
            pubdate: None,
        }
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Issue number derived from the normalized name.
    pub fn issue_number(&self) -> String {
        self.name
            .as_deref()
            .map(|name| normalize(name).issue_number)
            .unwrap_or_default()
    }

    /// Six digit lowercase hex form used in local mirror filenames.
    pub fn hex_id(&self) -> String {
        format!("{:06x}", self.id)
    }

    /// Display name, falling back to the id when the name is missing.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("pull {}", self.id))
    }
}

/// Wire representation accepted when decoding a [`Pull`].
#[derive(Debug, Deserialize)]
struct RawPull {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    identifier: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    weight: Option<Value>,
    #[serde(default)]
    stream_id: Option<Value>,
    #[serde(default)]
    volume_id: Option<Value>,
    #[serde(default)]
    read: Option<Value>,
    #[serde(default)]
    pulled: Option<Value>,
    #[serde(default)]
    pubdate: Option<String>,
}

impl TryFrom<RawPull> for Pull {
    type Error = String;

    fn try_from(raw: RawPull) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .as_ref()
            .or(raw.identifier.as_ref())
            .and_then(value_as_u64)
            .ok_or_else(|| "pull has no usable id".to_string())?;

        let weight = match raw.weight.as_ref() {
            None | Some(Value::Null) => 0.0,
            Some(value) => {
                value_as_f64(value).ok_or_else(|| format!("pull {} has invalid weight", id))?
            }
        };

        Ok(Pull {
            id,
            name: raw.name,
            weight,
            stream_id: raw.stream_id.as_ref().and_then(value_as_string),
            volume_id: raw.volume_id.as_ref().and_then(value_as_string),
            read: raw.read.as_ref().map(value_as_bool).unwrap_or(false),
            pulled: raw.pulled.as_ref().map(value_as_bool).unwrap_or(true),
            pubdate: raw.pubdate.as_deref().and_then(parse_pubdate),
        })
    }
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_pubdate(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ============================================================================
// API envelopes
// ============================================================================

/// A pull wrapped the way the list endpoints return it.
#[derive(Debug, Clone, Deserialize)]
pub struct PullEnvelope {
    pub pull: Pull,
}

/// One page of a cursor-paged listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PullPage {
    #[serde(default)]
    pub results: Vec<PullEnvelope>,
    #[serde(default)]
    pub more: bool,
    /// Cursor for the next page.
    #[serde(default)]
    pub position: Option<String>,
}

impl PullPage {
    pub fn pulls(&self) -> impl Iterator<Item = &Pull> {
        self.results.iter().map(|envelope| &envelope.pull)
    }

    pub fn into_pulls(self) -> Vec<Pull> {
        self.results.into_iter().map(|envelope| envelope.pull).collect()
    }
}

/// Response of the single pull endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PullLookup {
    #[serde(default)]
    pub results: Vec<PullEnvelope>,
}

/// Outcome of an update request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub updated: Vec<u64>,
    pub failed: Vec<u64>,
}

impl UpdateResult {
    pub fn is_updated(&self, id: u64) -> bool {
        self.updated.contains(&id)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateResponse {
    pub results: UpdateResults,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateResults {
    #[serde(default)]
    pub updated: Vec<Value>,
    #[serde(default)]
    pub failed: Vec<Value>,
}

impl From<UpdateResults> for UpdateResult {
    fn from(results: UpdateResults) -> Self {
        Self {
            updated: results.updated.iter().filter_map(value_as_u64).collect(),
            failed: results.failed.iter().filter_map(value_as_u64).collect(),
        }
    }
}
