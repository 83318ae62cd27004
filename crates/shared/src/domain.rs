use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A server-side artifact produced by the process step, keyed by file name.
///
/// Only the file name is required. Metadata the client cannot read is left
/// empty instead of failing the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedItem {
    #[serde(rename = "filename")]
    pub id: String,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(rename = "created", default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "modified", default, deserialize_with = "deserialize_timestamp")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(rename = "posted", default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// Parses RFC 3339 as well as the naive forms the backend emits for file
/// metadata (`T`- or space-separated, interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Profile of the connected third-party account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountProfile {
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub follower_count: Option<u64>,
    pub following_count: Option<u64>,
    pub item_count: Option<u64>,
}

/// Session state. Replaced wholesale on every status check or login result.
///
/// A session is connected exactly when a profile is present, so a
/// disconnected status can never carry stale profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub profile: Option<AccountProfile>,
    pub message: Option<String>,
}

impl SessionStatus {
    pub fn connected(profile: AccountProfile, message: Option<String>) -> Self {
        Self {
            profile: Some(profile),
            message,
        }
    }

    pub fn disconnected(message: Option<String>) -> Self {
        Self {
            profile: None,
            message,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.profile.is_some()
    }

    pub fn handle(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.handle.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReachability {
    pub reachable: bool,
    pub message: String,
    pub server_timestamp: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for ServerReachability {
    fn default() -> Self {
        Self {
            reachable: false,
            message: "Checking...".to_string(),
            server_timestamp: None,
            last_checked_at: None,
        }
    }
}

/// Mutating store actions that are tracked while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Login,
    Submit,
    Publish,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Login => "login",
            ActionKind::Submit => "submit",
            ActionKind::Publish => "publish",
            ActionKind::Delete => "delete",
        };
        f.write_str(name)
    }
}
