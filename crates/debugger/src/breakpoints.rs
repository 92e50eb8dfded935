use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transport::Request;

use crate::error::RegistryError;
use crate::records::{self, Record};

fn enabled_by_default() -> bool {
    true
}

/// A line breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub file: PathBuf,
    pub line: u32,
    /// Expression that must evaluate truthy for the breakpoint to trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Remove the breakpoint the first time it stops the program.
    #[serde(default)]
    pub temporary: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Number of triggering hits to skip before stopping.
    #[serde(default)]
    pub ignore_count: u32,
}

impl Breakpoint {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            condition: None,
            temporary: false,
            enabled: true,
            ignore_count: 0,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into()).filter(|c: &String| !c.trim().is_empty());
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

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_at(&self, file: &Path, line: u32) -> bool {
        self.file == file && self.line == line
    }

    fn wire_file(&self) -> String {
        self.file.display().to_string()
    }

    /// Request that sets (or clears) this breakpoint in the debuggee.
    pub fn set_request(&self, set: bool) -> Request {
        Request::Break {
            file: self.wire_file(),
            line: self.line,
            temporary: self.temporary,
            set,
            condition: self.condition.clone(),
        }
    }

    pub fn enable_request(&self) -> Request {
        Request::EnableBreak {
            file: self.wire_file(),
            line: self.line,
            enable: self.enabled,
        }
    }

    pub fn ignore_request(&self) -> Request {
        Request::IgnoreBreak {
            file: self.wire_file(),
            line: self.line,
            count: self.ignore_count,
        }
    }

    /// Requests that recreate this breakpoint, with its enabled flag and
    /// ignore count, in a debuggee that knows nothing about it.
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

impl Record for Breakpoint {
    const FIELDS: usize = 6;

    fn to_record(&self) -> Result<String, RegistryError> {
        records::join(&[
            &self.wire_file(),
            &self.line.to_string(),
            records::format_optional(self.condition()),
            records::format_bool(self.temporary),
            records::format_bool(self.enabled),
            &self.ignore_count.to_string(),
        ])
    }

    fn from_record(record: &str) -> Result<Self, RegistryError> {
        let [file, line, condition, temporary, enabled, ignore_count] =
            records::fields::<6>(record)?;

        if file.is_empty() {
            return Err(RegistryError::malformed(record, "empty file name"));
        }
        let line = line
            .trim()
            .parse()
            .map_err(|e| RegistryError::malformed(record, format!("bad line {line:?}: {e}")))?;

        Ok(Self {
            file: PathBuf::from(file),
            line,
            condition: records::parse_optional(condition),
            temporary: records::parse_bool(record, temporary)?,
            enabled: records::parse_bool(record, enabled)?,
            ignore_count: records::parse_count(record, ignore_count)?,
        })
    }
}
