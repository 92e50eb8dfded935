//! The IDE-side mirror of the breakpoints and watchpoints of a session.
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::breakable::{BreakableLinesCache, LineTableProvider};
use crate::breakpoints::Breakpoint;
use crate::error::{ConditionError, RegistryError};
use crate::records::Record;
use crate::watchpoints::Watchpoint;

/// Evaluates breakpoint and watchpoint conditions in the current frame.
pub trait ConditionEvaluator {
    fn evaluate(&mut self, condition: &str) -> Result<bool, ConditionError>;
}

impl<F> ConditionEvaluator for F
where
    F: FnMut(&str) -> Result<bool, ConditionError>,
{
    fn evaluate(&mut self, condition: &str) -> Result<bool, ConditionError> {
        self(condition)
    }
}

/// Kind of trace event watchpoints are checked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A new line is about to run.
    Line,
    /// A statement finished.
    Statement,
}

/// Identity of a breakpoint or watchpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointKey {
    Breakpoint { file: PathBuf, line: u32 },
    Watchpoint(String),
}

/// What happened when a point was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitOutcome {
    /// No enabled point here, or its condition was false.
    Pass,
    /// The point triggered but an ignore count swallowed it.
    Ignored { remaining: u32 },
    /// The condition could not be evaluated; the point does not trigger.
    /// `report` is only set the first time this point fails.
    ConditionError {
        error: ConditionError,
        report: bool,
    },
    /// Stop the program. Temporary points have already been removed.
    Stop { temporary: bool },
}

/// Result of checking all watchpoints for one trace event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOutcome {
    /// The first watchpoint that stopped the program.
    pub stop: Option<Watchpoint>,
    /// Condition errors that have not been reported before.
    pub errors: Vec<(String, ConditionError)>,
}

/// Breakpoints and watchpoints with their hit bookkeeping
#[derive(Default)]
pub struct Registry {
    breakpoints: BTreeMap<(PathBuf, u32), Breakpoint>,
    watchpoints: Vec<Watchpoint>,
    breakable_lines: BreakableLinesCache,
    provider: Option<Box<dyn LineTableProvider + Send>>,
    reported_errors: HashSet<PointKey>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("breakpoints", &self.breakpoints)
            .field("watchpoints", &self.watchpoints)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: impl LineTableProvider + Send + 'static) -> Self {
        let mut registry = Self::new();
        registry.set_provider(provider);
        registry
    }

    /// Replace the source of line tables. Cached lines are dropped.
    pub fn set_provider(&mut self, provider: impl LineTableProvider + Send + 'static) {
        self.provider = Some(Box::new(provider));
        self.breakable_lines.clear();
    }

    pub fn breakable_lines(&mut self) -> &mut BreakableLinesCache {
        &mut self.breakable_lines
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.breakable_lines.invalidate(path);
    }

    fn check_line(&mut self, file: &Path, line: u32) -> Result<(), RegistryError> {
        let Some(provider) = self.provider.as_deref() else {
            return Ok(());
        };
        match self.breakable_lines.lines(file, provider) {
            Some(lines) if !lines.contains(&line) => Err(RegistryError::InvalidLine {
                file: file.to_path_buf(),
                line,
            }),
            Some(_) => Ok(()),
            None => {
                tracing::debug!(file = %file.display(), line, "accepting breakpoint unchecked");
                Ok(())
            }
        }
    }

    pub fn add_breakpoint(
        &mut self,
        file: impl Into<PathBuf>,
        line: u32,
        condition: Option<String>,
        temporary: bool,
    ) -> Result<&Breakpoint, RegistryError> {
        let mut breakpoint = Breakpoint::new(file, line).temporary(temporary);
        if let Some(condition) = condition {
            breakpoint = breakpoint.with_condition(condition);
        }
        self.insert_breakpoint(breakpoint)
    }

    /// Add a fully specified breakpoint, replacing any at the same line.
    pub fn insert_breakpoint(
        &mut self,
        breakpoint: Breakpoint,
    ) -> Result<&Breakpoint, RegistryError> {
        self.check_line(&breakpoint.file, breakpoint.line)?;

        let key = (breakpoint.file.clone(), breakpoint.line);
        self.reported_errors.remove(&PointKey::Breakpoint {
            file: key.0.clone(),
            line: key.1,
        });
        tracing::debug!(file = %key.0.display(), line = key.1, "adding breakpoint");
        self.breakpoints.insert(key.clone(), breakpoint);
        Ok(&self.breakpoints[&key])
    }

    /// Parse a legacy record and add the breakpoint it describes.
    pub fn add_breakpoint_record(&mut self, record: &str) -> Result<&Breakpoint, RegistryError> {
        let breakpoint = Breakpoint::from_record(record)?;
        self.insert_breakpoint(breakpoint)
    }

    pub fn remove_breakpoint(&mut self, file: &Path, line: u32) -> Option<Breakpoint> {
        self.reported_errors.remove(&PointKey::Breakpoint {
            file: file.to_path_buf(),
            line,
        });
        self.breakpoints.remove(&(file.to_path_buf(), line))
    }

    pub fn breakpoint(&self, file: &Path, line: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&(file.to_path_buf(), line))
    }

    fn breakpoint_mut(&mut self, file: &Path, line: u32) -> Result<&mut Breakpoint, RegistryError> {
        self.breakpoints
            .get_mut(&(file.to_path_buf(), line))
            .ok_or_else(|| RegistryError::UnknownBreakpoint {
                file: file.to_path_buf(),
                line,
            })
    }

    pub fn enable_breakpoint(
        &mut self,
        file: &Path,
        line: u32,
        enabled: bool,
    ) -> Result<&Breakpoint, RegistryError> {
        let breakpoint = self.breakpoint_mut(file, line)?;
        breakpoint.enabled = enabled;
        Ok(breakpoint)
    }

    pub fn set_breakpoint_ignore_count(
        &mut self,
        file: &Path,
        line: u32,
        count: u32,
    ) -> Result<&Breakpoint, RegistryError> {
        let breakpoint = self.breakpoint_mut(file, line)?;
        breakpoint.ignore_count = count;
        Ok(breakpoint)
    }

    /// Breakpoints ordered by file and line.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn breakpoints_in<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a Breakpoint> {
        self.breakpoints
            .values()
            .filter(move |breakpoint| breakpoint.file == file)
    }

    pub fn add_watchpoint(&mut self, watchpoint: Watchpoint) -> Result<&Watchpoint, RegistryError> {
        if !watchpoint.is_valid() {
            return Err(RegistryError::InvalidWatchpoint);
        }
        if self.watchpoint(&watchpoint.condition).is_some() {
            return Err(RegistryError::DuplicateWatchpoint(watchpoint.condition));
        }
        tracing::debug!(condition = %watchpoint.condition, "adding watchpoint");
        self.reported_errors
            .remove(&PointKey::Watchpoint(watchpoint.condition.clone()));
        self.watchpoints.push(watchpoint);
        Ok(&self.watchpoints[self.watchpoints.len() - 1])
    }

    /// Parse a legacy record and add the watchpoint it describes. The
    /// registry is left untouched when the record is rejected.
    pub fn add_watchpoint_record(&mut self, record: &str) -> Result<&Watchpoint, RegistryError> {
        let watchpoint = Watchpoint::from_record(record)?;
        self.add_watchpoint(watchpoint)
    }

    /// `condition` may be given as sent on the wire.
    pub fn remove_watchpoint(&mut self, condition: &str) -> Option<Watchpoint> {
        let condition = Watchpoint::condition_from_wire(condition);
        let index = self
            .watchpoints
            .iter()
            .position(|watchpoint| watchpoint.condition == condition)?;
        self.reported_errors
            .remove(&PointKey::Watchpoint(condition.to_string()));
        Some(self.watchpoints.remove(index))
    }

    pub fn watchpoint(&self, condition: &str) -> Option<&Watchpoint> {
        let condition = Watchpoint::condition_from_wire(condition);
        self.watchpoints
            .iter()
            .find(|watchpoint| watchpoint.condition == condition)
    }

    fn watchpoint_mut(&mut self, condition: &str) -> Result<&mut Watchpoint, RegistryError> {
        let condition = Watchpoint::condition_from_wire(condition);
        self.watchpoints
            .iter_mut()
            .find(|watchpoint| watchpoint.condition == condition)
            .ok_or_else(|| RegistryError::UnknownWatchpoint(condition.to_string()))
    }

    pub fn enable_watchpoint(
        &mut self,
        condition: &str,
        enabled: bool,
    ) -> Result<&Watchpoint, RegistryError> {
        let watchpoint = self.watchpoint_mut(condition)?;
        watchpoint.enabled = enabled;
        Ok(watchpoint)
    }

    pub fn set_watchpoint_ignore_count(
        &mut self,
        condition: &str,
        count: u32,
    ) -> Result<&Watchpoint, RegistryError> {
        let watchpoint = self.watchpoint_mut(condition)?;
        watchpoint.ignore_count = count;
        Ok(watchpoint)
    }

    /// Watchpoints in the order they were added.
    pub fn watchpoints(&self) -> impl Iterator<Item = &Watchpoint> {
        self.watchpoints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty() && self.watchpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.watchpoints.clear();
        self.reported_errors.clear();
    }

    /// Record that a point's condition failed. Returns `true` the first time
    /// for each point, `false` afterwards.
    pub fn note_condition_error(&mut self, key: PointKey) -> bool {
        self.reported_errors.insert(key)
    }

    /// Decide whether the breakpoint at `file:line` stops the program.
    pub fn hit(
        &mut self,
        file: &Path,
        line: u32,
        evaluator: &mut dyn ConditionEvaluator,
    ) -> HitOutcome {
        let key = (file.to_path_buf(), line);
        let Some(breakpoint) = self.breakpoints.get_mut(&key) else {
            return HitOutcome::Pass;
        };
        if !breakpoint.enabled {
            return HitOutcome::Pass;
        }

        if let Some(condition) = breakpoint.condition.as_deref() {
            match evaluator.evaluate(condition) {
                Ok(true) => {}
                Ok(false) => return HitOutcome::Pass,
                Err(error) => {
                    let report = self.reported_errors.insert(PointKey::Breakpoint {
                        file: key.0,
                        line,
                    });
                    return HitOutcome::ConditionError { error, report };
                }
            }
        }

        if breakpoint.ignore_count > 0 {
            breakpoint.ignore_count -= 1;
            return HitOutcome::Ignored {
                remaining: breakpoint.ignore_count,
            };
        }

        let temporary = breakpoint.temporary;
        if temporary {
            tracing::debug!(file = %file.display(), line, "removing temporary breakpoint");
            self.remove_breakpoint(file, line);
        }
        HitOutcome::Stop { temporary }
    }

    /// Evaluate the watchpoints that apply to `event`, in insertion order,
    /// up to the first one that stops the program.
    ///
    /// Special watchpoints are checked on every event, the others only on
    /// statement events.
    pub fn check_watchpoints(
        &mut self,
        event: TraceEvent,
        evaluator: &mut dyn ConditionEvaluator,
    ) -> WatchOutcome {
        let mut outcome = WatchOutcome::default();
        let mut stopped = None;

        for (index, watchpoint) in self.watchpoints.iter_mut().enumerate() {
            if !watchpoint.enabled || (event == TraceEvent::Line && !watchpoint.special) {
                continue;
            }
            match evaluator.evaluate(&watchpoint.condition) {
                Ok(true) if watchpoint.ignore_count > 0 => {
                    watchpoint.ignore_count -= 1;
                }
                Ok(true) => {
                    stopped = Some(index);
                    break;
                }
                Ok(false) => {}
                Err(error) => {
                    let key = PointKey::Watchpoint(watchpoint.condition.clone());
                    if self.reported_errors.insert(key) {
                        outcome.errors.push((watchpoint.condition.clone(), error));
                    }
                }
            }
        }

        if let Some(index) = stopped {
            let watchpoint = if self.watchpoints[index].temporary {
                let watchpoint = self.watchpoints.remove(index);
                tracing::debug!(condition = %watchpoint.condition, "removing temporary watchpoint");
                watchpoint
            } else {
                self.watchpoints[index].clone()
            };
            outcome.stop = Some(watchpoint);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakable::CodeObject;

    fn registry() -> Registry {
        Registry::with_provider(|_: &Path| -> eyre::Result<CodeObject> {
            Ok(CodeObject {
                first_line: 1,
                line_table: vec![(2, 2), (4, 1), (6, 3)],
                children: Vec::new(),
            })
        })
    }

    fn always(value: bool) -> impl FnMut(&str) -> Result<bool, ConditionError> {
        move |_| Ok(value)
    }

    #[test]
    fn rejects_non_breakable_lines() {
        let mut registry = registry();
        assert_eq!(
            registry.add_breakpoint("/src/main.py", 2, None, false),
            Err(RegistryError::InvalidLine {
                file: PathBuf::from("/src/main.py"),
                line: 2
            })
        );
        assert!(registry.add_breakpoint("/src/main.py", 3, None, false).is_ok());
        assert_eq!(registry.breakpoints().count(), 1);
    }

    #[test]
    fn accepts_lines_without_provider() {
        let mut registry = Registry::new();
        assert!(registry.add_breakpoint("/src/main.py", 2, None, false).is_ok());
    }

    #[test]
    fn accepts_lines_when_file_does_not_compile() {
        let mut registry = Registry::with_provider(|_: &Path| -> eyre::Result<CodeObject> {
            eyre::bail!("syntax error")
        });
        assert!(registry.add_breakpoint("/src/broken.py", 2, None, false).is_ok());
    }

    #[test]
    fn ignore_count_then_temporary() {
        let mut registry = registry();
        let file = Path::new("/src/main.py");
        registry
            .insert_breakpoint(Breakpoint::new(file, 3).with_ignore_count(2).temporary(true))
            .unwrap();

        let mut evaluator = always(true);
        assert_eq!(
            registry.hit(file, 3, &mut evaluator),
            HitOutcome::Ignored { remaining: 1 }
        );
        assert_eq!(
            registry.hit(file, 3, &mut evaluator),
            HitOutcome::Ignored { remaining: 0 }
        );
        assert_eq!(
            registry.hit(file, 3, &mut evaluator),
            HitOutcome::Stop { temporary: true }
        );
        assert!(registry.breakpoint(file, 3).is_none());
        assert_eq!(registry.hit(file, 3, &mut evaluator), HitOutcome::Pass);
    }

    #[test]
    fn condition_applies_before_ignore_count() {
        let mut registry = Registry::new();
        let file = Path::new("/src/main.py");
        registry
            .insert_breakpoint(
                Breakpoint::new(file, 3)
                    .with_condition("x > 1")
                    .with_ignore_count(1),
            )
            .unwrap();

        assert_eq!(registry.hit(file, 3, &mut always(false)), HitOutcome::Pass);
        assert_eq!(registry.breakpoint(file, 3).unwrap().ignore_count, 1);
        assert_eq!(
            registry.hit(file, 3, &mut always(true)),
            HitOutcome::Ignored { remaining: 0 }
        );
        assert_eq!(
            registry.hit(file, 3, &mut always(true)),
            HitOutcome::Stop { temporary: false }
        );
        assert!(registry.breakpoint(file, 3).is_some());
    }

    #[test]
    fn disabled_breakpoint_does_not_stop() {
        let mut registry = Registry::new();
        let file = Path::new("/a.py");
        registry.add_breakpoint(file, 5, None, false).unwrap();
        registry.enable_breakpoint(file, 5, false).unwrap();
        assert_eq!(registry.hit(file, 5, &mut always(true)), HitOutcome::Pass);
        assert!(matches!(
            registry.enable_breakpoint(file, 6, true),
            Err(RegistryError::UnknownBreakpoint { .. })
        ));
    }

    #[test]
    fn condition_errors_reported_once() {
        let mut registry = Registry::new();
        let file = Path::new("/a.py");
        registry
            .insert_breakpoint(Breakpoint::new(file, 5).with_condition("undefined_name"))
            .unwrap();

        let mut failing = |_: &str| -> Result<bool, ConditionError> {
            Err(ConditionError::new("NameError"))
        };
        let outcomes: Vec<_> = (0..3).map(|_| registry.hit(file, 5, &mut failing)).collect();
        assert_eq!(
            outcomes,
            vec![
                HitOutcome::ConditionError {
                    error: ConditionError::new("NameError"),
                    report: true
                },
                HitOutcome::ConditionError {
                    error: ConditionError::new("NameError"),
                    report: false
                },
                HitOutcome::ConditionError {
                    error: ConditionError::new("NameError"),
                    report: false
                },
            ]
        );
    }

    #[test]
    fn watchpoint_validation() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.add_watchpoint(Watchpoint::new("  ")).unwrap_err(),
            RegistryError::InvalidWatchpoint
        );
        registry.add_watchpoint(Watchpoint::new("x")).unwrap();
        assert_eq!(
            registry.add_watchpoint(Watchpoint::new("x")).unwrap_err(),
            RegistryError::DuplicateWatchpoint("x".to_string())
        );
    }

    #[test]
    fn malformed_record_leaves_registry_unchanged() {
        let mut registry = Registry::new();
        registry.add_watchpoint(Watchpoint::new("y")).unwrap();

        assert!(matches!(
            registry.add_watchpoint_record("cond:::True:::False"),
            Err(RegistryError::MalformedRecord { .. })
        ));
        assert_eq!(
            registry.watchpoints().cloned().collect::<Vec<_>>(),
            vec![Watchpoint::new("y")]
        );
    }

    #[test]
    fn watchpoints_by_trace_event() {
        let mut registry = Registry::new();
        registry.add_watchpoint(Watchpoint::new("normal")).unwrap();
        registry
            .add_watchpoint(Watchpoint::new("special").special(true))
            .unwrap();

        let mut seen = Vec::new();
        let mut evaluator = |condition: &str| -> Result<bool, ConditionError> {
            seen.push(condition.to_string());
            Ok(false)
        };
        registry.check_watchpoints(TraceEvent::Line, &mut evaluator);
        registry.check_watchpoints(TraceEvent::Statement, &mut evaluator);
        assert_eq!(seen, vec!["special", "normal", "special"]);
    }

    #[test]
    fn watchpoint_ignore_count_and_temporary() {
        let mut registry = Registry::new();
        registry
            .add_watchpoint(Watchpoint::new("done").with_ignore_count(1).temporary(true))
            .unwrap();

        let outcome = registry.check_watchpoints(TraceEvent::Statement, &mut always(true));
        assert_eq!(outcome.stop, None);
        assert_eq!(registry.watchpoint("done").unwrap().ignore_count, 0);

        let outcome = registry.check_watchpoints(TraceEvent::Statement, &mut always(true));
        assert_eq!(outcome.stop.map(|wp| wp.condition), Some("done".to_string()));
        assert!(registry.watchpoint("done").is_none());
    }

    #[test]
    fn watchpoint_condition_errors_reported_once() {
        let mut registry = Registry::new();
        registry.add_watchpoint(Watchpoint::new("1/0")).unwrap();
        registry.add_watchpoint(Watchpoint::new("ok")).unwrap();

        let mut evaluator = |condition: &str| -> Result<bool, ConditionError> {
            if condition == "1/0" {
                Err(ConditionError::new("ZeroDivisionError"))
            } else {
                Ok(false)
            }
        };
        let first = registry.check_watchpoints(TraceEvent::Statement, &mut evaluator);
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.errors[0].0, "1/0");
        let second = registry.check_watchpoints(TraceEvent::Statement, &mut evaluator);
        assert!(second.errors.is_empty());
        assert_eq!(second.stop, None);
    }

    #[test]
    fn watchpoints_by_wire_condition() {
        let mut registry = Registry::new();
        registry
            .add_watchpoint(Watchpoint::new("items").special(true))
            .unwrap();
        assert!(registry.watchpoint("items ??changed??").is_some());
        assert!(registry.remove_watchpoint("items ??changed??").is_some());
        assert!(registry.is_empty());
    }
}
