//! Command record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracked state of one queued command.
///
/// `updated_date` only moves forward; once `completed` is set the record is
/// terminal and no further mutation is permitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    /// Unique id handed back to the caller at queue time
    pub id: Uuid,
    /// The command text as queued
    pub command: String,
    /// Whether execution has begun
    pub started: bool,
    /// Whether completion will be followed by a process restart
    pub restarting: bool,
    /// Terminal flag
    pub completed: bool,
    /// Exit classification, present once terminal
    pub success: Option<bool>,
    /// Last mutation timestamp, strictly increasing per record
    pub updated_date: DateTime<Utc>,
}

impl CommandRecord {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            started: false,
            restarting: false,
            completed: false,
            success: None,
            updated_date: Utc::now(),
        }
    }

    /// `updated_date` as epoch milliseconds, the long-poll cursor unit.
    pub fn updated_millis(&self) -> i64 {
        self.updated_date.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let record = CommandRecord::new("install sitekit-plugin-forms");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("updatedDate").is_some());
        assert!(json.get("restarting").is_some());
        assert_eq!(json["started"], false);
    }
}
