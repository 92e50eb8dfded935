//! Breakable lines of a source file.
//!
//! Only lines that start a run of bytecode can stop the program. They are
//! found by walking the line-number table of the file's compiled code object
//! and of every code object nested inside it.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// A compiled unit of code as reported by a [`LineTableProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeObject {
    pub first_line: u32,
    /// `(byte offset delta, line delta)` pairs in bytecode order.
    pub line_table: Vec<(u8, i8)>,
    /// Functions, classes and comprehensions defined inside this object.
    pub children: Vec<CodeObject>,
}

impl CodeObject {
    /// Lines of this object alone, ignoring its children.
    ///
    /// A line is breakable when bytecode is emitted for it: the first line
    /// always is, every later line is unless the next table entry advances
    /// the line again without advancing the byte offset, and the line
    /// reached by the final entry always is.
    fn own_lines(&self, lines: &mut BTreeSet<u32>) {
        let mut line = i64::from(self.first_line);
        lines.insert(self.first_line);

        for (index, (_, line_delta)) in self.line_table.iter().enumerate() {
            line += i64::from(*line_delta);
            let owns_bytecode = match self.line_table.get(index + 1) {
                Some((next_byte_delta, _)) => *next_byte_delta != 0,
                None => true,
            };
            if owns_bytecode {
                if let Ok(line) = u32::try_from(line) {
                    lines.insert(line);
                }
            }
        }
    }

    /// Breakable lines of this object and everything nested in it.
    pub fn breakable_lines(&self) -> BTreeSet<u32> {
        let mut lines = BTreeSet::new();
        let mut queue = VecDeque::from([self]);
        while let Some(code) = queue.pop_front() {
            code.own_lines(&mut lines);
            let mut children: Vec<&CodeObject> = code.children.iter().collect();
            children.sort_by_key(|child| child.first_line);
            queue.extend(children);
        }
        lines
    }
}

/// Compiles source files into [`CodeObject`]s.
pub trait LineTableProvider {
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not compile.
    fn code_object(&self, path: &Path) -> eyre::Result<CodeObject>;
}

impl<F> LineTableProvider for F
where
    F: Fn(&Path) -> eyre::Result<CodeObject>,
{
    fn code_object(&self, path: &Path) -> eyre::Result<CodeObject> {
        self(path)
    }
}

/// Breakable lines per file, computed once and kept until invalidated
#[derive(Debug, Default)]
pub struct BreakableLinesCache {
    files: HashMap<PathBuf, BTreeSet<u32>>,
}

impl BreakableLinesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breakable lines of `path`, asking `provider` on a cache miss.
    ///
    /// Returns `None` when the provider has no line table for the file.
    /// Failures are not cached so a later call tries again.
    pub fn lines(
        &mut self,
        path: &Path,
        provider: &dyn LineTableProvider,
    ) -> Option<&BTreeSet<u32>> {
        if !self.files.contains_key(path) {
            match provider.code_object(path) {
                Ok(code) => {
                    let lines = code.breakable_lines();
                    tracing::debug!(
                        path = %path.display(),
                        count = lines.len(),
                        "computed breakable lines"
                    );
                    self.files.insert(path.to_path_buf(), lines);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "no line table available");
                    return None;
                }
            }
        }
        self.files.get(path)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Forget the lines of a file, e.g. after it was edited.
    pub fn invalidate(&mut self, path: &Path) {
        if self.files.remove(path).is_some() {
            tracing::debug!(path = %path.display(), "invalidated breakable lines");
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}
