//! The state module handles persisting the breakpoints, watchpoints and
//! ignored exceptions of a debugging session between sessions.

use std::{
    collections::BTreeMap,
    io::{BufRead, Read, Write},
    path::{Path, PathBuf},
};

use debugger::{Breakpoint, Record, Registry, RegistryError, Watchpoint};
use eyre::Context;
use serde::{Deserialize, Serialize};

/// Version written into new state files.
pub const STATE_VERSION: &str = "1";

pub struct StateManager {
    save_path: PathBuf,
    current: Persistence,
}

impl StateManager {
    pub fn new(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let span = tracing::debug_span!("StateManager", state_path = %path.display());
        let _guard = span.enter();

        if !path.exists() {
            tracing::debug!("no state file, creating one");
            let state = Persistence::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).wrap_err("creating state directory")?;
            }
            crate::save_to(&state, &path).wrap_err("saving state file")?;
            return Ok(Self {
                save_path: path,
                current: state,
            });
        }

        tracing::debug!("attempting to load state");
        let state = crate::load_from(&path).wrap_err("loading state file")?;
        tracing::debug!("state loaded");
        Ok(Self {
            save_path: path,
            current: state,
        })
    }

    /// State file next to the user's other configuration.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cdm-debug").join("state.json"))
    }

    pub fn load(mut self) -> eyre::Result<Self> {
        let state = crate::load_from(&self.save_path).wrap_err("loading state")?;
        self.current = state;
        Ok(self)
    }

    pub fn save(self) -> eyre::Result<Self> {
        crate::save_to(&self.current, &self.save_path).wrap_err("saving state")?;
        Ok(self)
    }

    pub fn current(&self) -> &Persistence {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Persistence {
        &mut self.current
    }

    /// Merge the points of a legacy project file into the current state.
    ///
    /// Malformed lines are skipped; their errors are returned.
    pub fn import_legacy(&mut self, reader: impl BufRead) -> eyre::Result<Vec<RegistryError>> {
        let imported = import_legacy(reader).wrap_err("reading legacy records")?;
        tracing::debug!(
            breakpoints = imported.breakpoints.len(),
            watchpoints = imported.watchpoints.len(),
            skipped = imported.errors.len(),
            "imported legacy records"
        );
        for breakpoint in imported.breakpoints {
            self.current.add_breakpoint(breakpoint);
        }
        for watchpoint in imported.watchpoints {
            self.current.add_watchpoint(watchpoint);
        }
        Ok(imported.errors)
    }
}

/// State that is persisted
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Persistence {
    pub version: String,
    #[serde(default)]
    pub projects: Vec<PerFile>,
    #[serde(default)]
    pub watchpoints: Vec<Watchpoint>,
    #[serde(default)]
    pub ignored_exceptions: Vec<String>,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            projects: Vec::new(),
            watchpoints: Vec::new(),
            ignored_exceptions: Vec::new(),
        }
    }
}

/// State that is persisted per file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PerFile {
    pub path: PathBuf,
    pub breakpoints: Vec<Breakpoint>,
}

impl Persistence {
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.projects
            .iter()
            .flat_map(|project| project.breakpoints.iter())
    }

    /// Add a breakpoint, replacing one on the same line.
    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) {
        let project = match self
            .projects
            .iter()
            .position(|project| project.path == breakpoint.file)
        {
            Some(index) => &mut self.projects[index],
            None => {
                self.projects.push(PerFile {
                    path: breakpoint.file.clone(),
                    breakpoints: Vec::new(),
                });
                let last = self.projects.len() - 1;
                &mut self.projects[last]
            }
        };
        project
            .breakpoints
            .retain(|existing| existing.line != breakpoint.line);
        project.breakpoints.push(breakpoint);
    }

    /// Add a watchpoint unless one with the same condition is stored.
    pub fn add_watchpoint(&mut self, watchpoint: Watchpoint) {
        if self
            .watchpoints
            .iter()
            .any(|existing| existing.condition == watchpoint.condition)
        {
            tracing::debug!(condition = %watchpoint.condition, "watchpoint already stored");
            return;
        }
        self.watchpoints.push(watchpoint);
    }

    /// Replace the stored points and exception list with a snapshot of a
    /// session.
    pub fn record<'a>(
        &mut self,
        breakpoints: impl IntoIterator<Item = &'a Breakpoint>,
        watchpoints: impl IntoIterator<Item = &'a Watchpoint>,
        ignored_exceptions: impl IntoIterator<Item = String>,
    ) {
        let mut by_file: BTreeMap<PathBuf, Vec<Breakpoint>> = BTreeMap::new();
        for breakpoint in breakpoints {
            by_file
                .entry(breakpoint.file.clone())
                .or_default()
                .push(breakpoint.clone());
        }
        self.projects = by_file
            .into_iter()
            .map(|(path, breakpoints)| PerFile { path, breakpoints })
            .collect();
        self.watchpoints = watchpoints.into_iter().cloned().collect();
        self.ignored_exceptions = ignored_exceptions.into_iter().collect();
    }

    /// Load every stored point into `registry`.
    ///
    /// Points the registry rejects, e.g. breakpoints on lines that no longer
    /// hold code, are skipped and their errors returned.
    pub fn restore_into(&self, registry: &mut Registry) -> Vec<RegistryError> {
        let mut errors = Vec::new();
        for breakpoint in self.breakpoints() {
            if let Err(e) = registry.insert_breakpoint(breakpoint.clone()) {
                tracing::warn!(error = %e, "skipping stored breakpoint");
                errors.push(e);
            }
        }
        for watchpoint in &self.watchpoints {
            if let Err(e) = registry.add_watchpoint(watchpoint.clone()) {
                tracing::warn!(error = %e, "skipping stored watchpoint");
                errors.push(e);
            }
        }
        errors
    }
}

/// Points read from a legacy project file
#[derive(Debug, Default)]
pub struct LegacyImport {
    pub breakpoints: Vec<Breakpoint>,
    pub watchpoints: Vec<Watchpoint>,
    /// One entry per skipped line.
    pub errors: Vec<RegistryError>,
}

/// Read separator-form records, one per line. The field count tells
/// breakpoints and watchpoints apart; blank lines are ignored.
pub fn import_legacy(reader: impl BufRead) -> eyre::Result<LegacyImport> {
    let mut imported = LegacyImport::default();
    for line in reader.lines() {
        let line = line.context("reading legacy record")?;
        if line.trim().is_empty() {
            continue;
        }

        let fields = line.split(debugger::records::SEPARATOR).count();
        let result = if fields == Breakpoint::FIELDS {
            Breakpoint::from_record(&line).map(|bp| imported.breakpoints.push(bp))
        } else if fields == Watchpoint::FIELDS {
            Watchpoint::from_record(&line).map(|wp| imported.watchpoints.push(wp))
        } else {
            Err(RegistryError::MalformedRecord {
                record: line.clone(),
                reason: format!("{fields} fields is neither a breakpoint nor a watchpoint"),
            })
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "skipping legacy record");
            imported.errors.push(e);
        }
    }
    Ok(imported)
}

pub fn save(state: &Persistence, writer: impl Write) -> eyre::Result<()> {
    serde_json::to_writer_pretty(writer, state).context("saving debugger state")?;
    Ok(())
}

pub fn save_to(state: &Persistence, path: impl AsRef<Path>) -> eyre::Result<()> {
    let f = std::fs::File::create(path).context("creating file for saving")?;
    save(state, &f).context("saving state")?;
    Ok(())
}

pub fn load(reader: impl Read) -> eyre::Result<Persistence> {
    let st = serde_json::from_reader(reader).context("reading debugger state")?;
    Ok(st)
}

pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Persistence> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening save state {}", path.display()))?;
    let state = load(f).context("reading from state file")?;
    Ok(state)
}
