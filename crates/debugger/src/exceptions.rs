use std::collections::{BTreeSet, HashMap};

use transport::types::ExceptionReport;

/// What the session does with a received exception report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Show the report to the user.
    Report(ExceptionReport),
    /// The type is on the ignore list; `count` is how many of this type have
    /// been swallowed so far.
    Ignored { type_name: String, count: u64 },
}

/// Filters exception reports against the user's ignore list
#[derive(Debug, Default)]
pub struct ExceptionChannel {
    ignored: BTreeSet<String>,
    ignored_counts: HashMap<String, u64>,
    last: Option<ExceptionReport>,
}

impl ExceptionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_ignored(&self, type_name: &str) -> bool {
        self.ignored.contains(type_name)
    }

    /// Returns `false` if the type was already ignored.
    pub fn set_ignored(&mut self, type_name: impl Into<String>) -> bool {
        self.ignored.insert(type_name.into())
    }

    /// Returns `false` if the type was not ignored.
    pub fn unset_ignored(&mut self, type_name: &str) -> bool {
        self.ignored.remove(type_name)
    }

    pub fn ignored(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(String::as_str)
    }

    /// Number of reports of this type swallowed so far.
    pub fn ignored_count(&self, type_name: &str) -> u64 {
        self.ignored_counts.get(type_name).copied().unwrap_or(0)
    }

    /// The most recent report that was shown to the user.
    pub fn last(&self) -> Option<&ExceptionReport> {
        self.last.as_ref()
    }

    /// Route one report. Reports raised inside an evaluated expression lose
    /// their stack, which only points into the evaluation machinery.
    pub fn receive(&mut self, mut report: ExceptionReport) -> Delivery {
        if self.is_ignored(&report.type_name) {
            let count = self
                .ignored_counts
                .entry(report.type_name.clone())
                .or_default();
            *count += 1;
            tracing::debug!(type_name = %report.type_name, count = *count, "ignoring exception");
            return Delivery::Ignored {
                type_name: report.type_name,
                count: *count,
            };
        }

        if report.raised_in_eval() {
            report.stack.clear();
        }
        self.last = Some(report.clone());
        Delivery::Report(report)
    }

    pub fn clear_last(&mut self) {
        self.last = None;
    }
}
