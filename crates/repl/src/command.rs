use std::{path::PathBuf, str::FromStr};

use color_eyre::eyre::{self, bail};
use transport::types::Scope;

/// A breakpoint location as given on the command line: `file:line[:condition]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub file: PathBuf,
    pub line: u32,
    pub condition: Option<String>,
}

impl FromStr for BreakpointSpec {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(file), Some(line)) = (parts.next(), parts.next()) else {
            bail!("expected file:line[:condition], got {s:?}");
        };
        if file.is_empty() {
            bail!("missing file in {s:?}");
        }
        let line = line
            .trim()
            .parse()
            .map_err(|e| eyre::eyre!("invalid line number in {s:?}: {e}"))?;
        let condition = parts
            .next()
            .map(str::trim)
            .filter(|condition| !condition.is_empty())
            .map(String::from);
        Ok(Self {
            file: PathBuf::from(file),
            line,
            condition,
        })
    }
}

impl From<BreakpointSpec> for debugger::Breakpoint {
    fn from(spec: BreakpointSpec) -> Self {
        let breakpoint = debugger::Breakpoint::new(spec.file, spec.line);
        match spec.condition {
            Some(condition) => breakpoint.with_condition(condition),
            None => breakpoint,
        }
    }
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Continue,
    Step,
    StepOver,
    StepOut,
    /// Leave the program running and stop debugging it.
    Quit,
    Stack,
    Threads,
    Variables(Scope),
    Eval(String),
    Exec(String),
    Break(BreakpointSpec),
    Clear { file: PathBuf, line: u32 },
    Ignore(String),
    /// Ask the debuggee to exit.
    Exit,
    Empty,
}

impl FromStr for Command {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = match s.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (s, ""),
        };

        let command = match word {
            "" => Command::Empty,
            "c" => Command::Continue,
            "s" => Command::Step,
            "n" => Command::StepOver,
            "o" => Command::StepOut,
            "q" => Command::Quit,
            "stack" => Command::Stack,
            "threads" => Command::Threads,
            "vars" => Command::Variables(match rest {
                "" | "local" => Scope::Local,
                "global" => Scope::Global,
                other => bail!("unknown scope {other:?}, expected local or global"),
            }),
            "eval" | "exec" if rest.is_empty() => bail!("{word} needs an argument"),
            "eval" => Command::Eval(rest.to_string()),
            "exec" => Command::Exec(rest.to_string()),
            "break" => Command::Break(rest.parse()?),
            "clear" => {
                let spec: BreakpointSpec = rest.parse()?;
                Command::Clear {
                    file: spec.file,
                    line: spec.line,
                }
            }
            "ignore" if rest.is_empty() => bail!("ignore needs an exception type"),
            "ignore" => Command::Ignore(rest.to_string()),
            "exit" => Command::Exit,
            other => bail!("unknown command {other:?}"),
        };
        Ok(command)
    }
}
