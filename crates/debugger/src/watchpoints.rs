use serde::{Deserialize, Serialize};
use transport::Request;

use crate::error::RegistryError;
use crate::records::{self, Record};

/// Marker the debuggee uses to tell special watchpoints apart.
const SPECIAL_SUFFIX: &str = " ??changed??";

fn enabled_by_default() -> bool {
    true
}

/// A watch expression, keyed by its condition text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watchpoint {
    /// Empty for a watchpoint that was stored without one, which makes it
    /// invalid.
    #[serde(default)]
    pub condition: String,
    /// Evaluated on every line event instead of only on statements.
    #[serde(default)]
    pub special: bool,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub ignore_count: u32,
}

impl Watchpoint {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            special: false,
            temporary: false,
            enabled: true,
            ignore_count: 0,
        }
    }

    pub fn special(mut self, special: bool) -> Self {
        self.special = special;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn with_ignore_count(mut self, ignore_count: u32) -> Self {
        self.ignore_count = ignore_count;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.condition.trim().is_empty()
    }

    /// Condition text as the debuggee knows it.
    pub fn wire_condition(&self) -> String {
        if self.special {
            format!("{}{SPECIAL_SUFFIX}", self.condition)
        } else {
            self.condition.clone()
        }
    }

    /// Undo [`Watchpoint::wire_condition`] on text received from the debuggee.
    pub fn condition_from_wire(condition: &str) -> &str {
        condition.strip_suffix(SPECIAL_SUFFIX).unwrap_or(condition)
    }

    pub fn set_request(&self, set: bool) -> Request {
        Request::Watch {
            condition: self.wire_condition(),
            temporary: self.temporary,
            set,
        }
    }

    pub fn enable_request(&self) -> Request {
        Request::EnableWatch {
            condition: self.wire_condition(),
            enable: self.enabled,
        }
    }

    pub fn ignore_request(&self) -> Request {
        Request::IgnoreWatch {
            condition: self.wire_condition(),
            count: self.ignore_count,
        }
    }

    /// Requests that recreate this watchpoint in a fresh debuggee.
    pub fn sync_requests(&self) -> Vec<Request> {
        let mut requests = vec![self.set_request(true)];
        if !self.enabled {
            requests.push(self.enable_request());
        }
        if self.ignore_count > 0 {
            requests.push(self.ignore_request());
        }
        requests
    }
}

impl Record for Watchpoint {
    const FIELDS: usize = 5;

    fn to_record(&self) -> Result<String, RegistryError> {
        let condition = Some(self.condition.as_str()).filter(|_| self.is_valid());
        records::join(&[
            records::format_optional(condition),
            records::format_bool(self.special),
            records::format_bool(self.temporary),
            records::format_bool(self.enabled),
            &self.ignore_count.to_string(),
        ])
    }

    fn from_record(record: &str) -> Result<Self, RegistryError> {
        let [condition, special, temporary, enabled, ignore_count] =
            records::fields::<5>(record)?;

        Ok(Self {
            condition: records::parse_optional(condition).unwrap_or_default(),
            special: records::parse_bool(record, special)?,
            temporary: records::parse_bool(record, temporary)?,
            enabled: records::parse_bool(record, enabled)?,
            ignore_count: records::parse_count(record, ignore_count)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_record_round_trip() {
        let wp = Watchpoint::new("counter == 10").with_ignore_count(2);
        let record = wp.to_record().unwrap();
        assert_eq!(record, "counter == 10:::False:::False:::True:::2");
        assert_eq!(Watchpoint::from_record(&record).unwrap(), wp);
    }

    #[test]
    fn absent_condition_stays_invalid() {
        let wp = Watchpoint::new("");
        assert!(!wp.is_valid());

        let record = wp.to_record().unwrap();
        assert!(record.starts_with("None:::"));

        let parsed = Watchpoint::from_record(&record).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn separator_in_condition_is_not_recorded() {
        let wp = Watchpoint::new("line.split(':::')[0] == 'x'");
        assert!(matches!(
            wp.to_record(),
            Err(RegistryError::UnrepresentableField(_))
        ));
    }

    #[test]
    fn short_record_is_malformed() {
        assert!(matches!(
            Watchpoint::from_record("cond:::True:::False"),
            Err(RegistryError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn mapping_round_trip() {
        let wp = Watchpoint::new("x is None").special(true).temporary(true);
        let json = serde_json::to_string(&wp).unwrap();
        let parsed: Watchpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wp);
    }

    #[test]
    fn special_condition_on_the_wire() {
        let wp = Watchpoint::new("len(items)").special(true);
        assert_eq!(wp.wire_condition(), "len(items) ??changed??");
        assert_eq!(
            Watchpoint::condition_from_wire(&wp.wire_condition()),
            "len(items)"
        );
        assert_eq!(Watchpoint::condition_from_wire("a > b"), "a > b");
    }

    #[test]
    fn disabled_watchpoint_sync() {
        let wp = Watchpoint::new("flag").disabled();
        assert_eq!(
            wp.sync_requests(),
            vec![
                Request::Watch {
                    condition: "flag".to_string(),
                    temporary: false,
                    set: true,
                },
                Request::EnableWatch {
                    condition: "flag".to_string(),
                    enable: false,
                },
            ]
        );
    }
}
