use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error_handling::types::StorageError;

/// Minute-resolution timestamp layout used for `Data::date_time`.
///
/// Lexicographic order of strings in this layout equals chronological order,
/// which the embedded backend's key order relies on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Pivoted read shape: `Topic -> DateTime -> Value`.
pub type View = BTreeMap<String, BTreeMap<String, String>>;

static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]{1,64}$").expect("static regex"));

/// Current local time truncated to the minute, in [`TIMESTAMP_FORMAT`].
pub fn now_minute() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// One telemetry sample.
///
/// `(module, topic, date_time)` identifies a stored sample; writing the same
/// triple again replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Data {
    pub module: String,
    pub date_time: String,
    pub topic: String,
    pub value: String,
}

impl Data {
    pub fn new(
        module: impl Into<String>,
        date_time: impl Into<String>,
        topic: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            date_time: date_time.into(),
            topic: topic.into(),
            value: value.into(),
        }
    }

    /// Checks the write preconditions and returns the validated module name.
    pub fn validate(&self) -> Result<ModuleName, StorageError> {
        let module = ModuleName::parse(&self.module)?;
        if self.topic.is_empty() {
            return Err(StorageError::InvalidArgument("topic is empty".into()));
        }
        Ok(module)
    }

    /// Fills an empty `date_time` with [`now_minute`].
    pub fn with_default_timestamp(mut self) -> Self {
        if self.date_time.is_empty() {
            self.date_time = now_minute();
        }
        self
    }

    /// Composite key used by the embedded backend: `<topic>-<date_time>`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.topic, self.date_time)
    }
}

/// Raw message as received from the bus, before it is mapped to a [`Data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(rename = "ID")]
    pub id: u64,
    pub date_time: String,
    pub topic: String,
    pub message: String,
}

impl Message {
    /// Stamps an incoming `(topic, payload)` pair with the current minute.
    pub fn received(id: u64, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id,
            date_time: now_minute(),
            topic: topic.into(),
            message: payload.into(),
        }
    }
}

/// A module name that is safe to use as a bucket or table identifier.
///
/// Accepts `[a-z0-9_-]{1,64}` and rejects the `sqlite_` prefix reserved by
/// the relational engine. Upper case is refused because SQLite table names
/// compare case-insensitively: `cave` and `Cave` would share one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn parse(name: &str) -> Result<Self, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidArgument("module name is empty".into()));
        }
        if !MODULE_NAME_RE.is_match(name) {
            return Err(StorageError::InvalidArgument(format!(
                "module name {:?} must match [a-z0-9_-]{{1,64}}",
                name
            )));
        }
        if name.starts_with("sqlite_") {
            return Err(StorageError::InvalidArgument(format!(
                "module name {:?} uses a reserved prefix",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_module_name_allow_list() {
        assert!(ModuleName::parse("cave").is_ok());
        assert!(ModuleName::parse("no-such-module").is_ok());
        assert!(ModuleName::parse("test_module_1").is_ok());

        for bad in [
            "",
            "a b",
            "x`; DROP TABLE y; --",
            "quo\"te",
            "sqlite_master",
            "SQLITE_x",
            "Cave",
            "test_Module",
        ] {
            assert!(
                matches!(ModuleName::parse(bad), Err(StorageError::InvalidArgument(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(ModuleName::parse(&"m".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_requires_topic() {
        let data = Data::new("m", "", "", "x");
        assert!(matches!(data.validate(), Err(StorageError::InvalidArgument(_))));

        let data = Data::new("", "", "t", "x");
        assert!(matches!(data.validate(), Err(StorageError::InvalidArgument(_))));

        let data = Data::new("m", "", "t", "");
        assert_eq!(data.validate().unwrap().as_str(), "m");
    }

    #[test]
    fn test_default_timestamp_is_minute_resolution() {
        let data = Data::new("m", "", "t", "x").with_default_timestamp();
        assert_eq!(data.date_time.len(), "2022-01-02 03:04".len());
        assert!(NaiveDateTime::parse_from_str(&data.date_time, TIMESTAMP_FORMAT).is_ok());

        let kept = Data::new("m", "2022-01-02 03:04", "t", "x").with_default_timestamp();
        assert_eq!(kept.date_time, "2022-01-02 03:04");
    }

    #[test]
    fn test_key_layout() {
        let data = Data::new("m", "2022-01-02 03:04", "temp", "1");
        assert_eq!(data.key(), "temp-2022-01-02 03:04");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(Data::new("m", "d", "t", "v")).unwrap();
        assert_eq!(json["Module"], "m");
        assert_eq!(json["DateTime"], "d");
        assert_eq!(json["Topic"], "t");
        assert_eq!(json["Value"], "v");
    }

    #[test]
    fn test_message_received_is_stamped() {
        let msg = Message::received(7, "croco/cave/heater", "1");
        assert_eq!(msg.id, 7);
        assert_eq!(msg.message, "1");
        assert!(!msg.date_time.is_empty());
    }
}
