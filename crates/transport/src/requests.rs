//! Requests sent from the IDE to a debuggee.
//!
//! Arguments travel as text in the message payload. The field layouts here
//! are what debuggee clients parse, so they are kept exactly.
use std::path::PathBuf;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::types::Scope;
use crate::word::Word;

/// Which side of a fork the debugger follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkTarget {
    Parent,
    Child,
}

impl ForkTarget {
    fn as_str(self) -> &'static str {
        match self {
            ForkTarget::Parent => "parent",
            ForkTarget::Child => "child",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start a script under the debugger.
    Load {
        working_directory: PathBuf,
        program: PathBuf,
        args: Vec<String>,
        /// Also trace into the standard library.
        trace_stdlib: bool,
    },
    Continue {
        /// Keep evaluating special watchpoints while running.
        special: bool,
    },
    Step,
    StepOver,
    StepOut,
    StepQuit,
    /// Set (`set == true`) or clear a breakpoint in the debuggee.
    Break {
        file: String,
        line: u32,
        temporary: bool,
        set: bool,
        condition: Option<String>,
    },
    EnableBreak {
        file: String,
        line: u32,
        enable: bool,
    },
    IgnoreBreak {
        file: String,
        line: u32,
        count: u32,
    },
    Watch {
        condition: String,
        temporary: bool,
        set: bool,
    },
    EnableWatch {
        condition: String,
        enable: bool,
    },
    IgnoreWatch {
        condition: String,
        count: u32,
    },
    Variables {
        frame: u32,
        scope: Scope,
    },
    /// Expand a single variable.
    Variable {
        name: String,
        frame: u32,
        scope: Scope,
    },
    ThreadList,
    ThreadSet {
        thread: i64,
    },
    Eval {
        frame: u32,
        expression: String,
    },
    Exec {
        frame: u32,
        statement: String,
    },
    Shutdown,
    ForkTo(ForkTarget),
    CurrentStack,
    /// Liveness probe.
    Ping,
}

impl Request {
    pub fn word(&self) -> Word {
        match self {
            Request::Load { .. } => Word::Load,
            Request::Continue { .. } => Word::Continue,
            Request::Step => Word::Step,
            Request::StepOver => Word::StepOver,
            Request::StepOut => Word::StepOut,
            Request::StepQuit => Word::StepQuit,
            Request::Break { .. } => Word::Break,
            Request::EnableBreak { .. } => Word::EnableBreak,
            Request::IgnoreBreak { .. } => Word::IgnoreBreak,
            Request::Watch { .. } => Word::Watch,
            Request::EnableWatch { .. } => Word::EnableWatch,
            Request::IgnoreWatch { .. } => Word::IgnoreWatch,
            Request::Variables { .. } => Word::Variables,
            Request::Variable { .. } => Word::Variable,
            Request::ThreadList => Word::ThreadList,
            Request::ThreadSet { .. } => Word::ThreadSet,
            Request::Eval { .. } => Word::Eval,
            Request::Exec { .. } => Word::Exec,
            Request::Shutdown => Word::Shutdown,
            Request::ForkTo(_) => Word::ForkTo,
            Request::CurrentStack => Word::CurrentStack,
            Request::Ping => Word::Ok,
        }
    }

    /// Reply words that complete this request, empty when none is expected.
    pub fn reply_words(&self) -> &'static [Word] {
        match self {
            Request::Eval { .. } => &[Word::EvalOK, Word::EvalError],
            Request::Exec { .. } => &[Word::Exec, Word::ExecError],
            Request::Variables { .. } => &[Word::Variables],
            Request::Variable { .. } => &[Word::Variable],
            Request::ThreadList => &[Word::ThreadList],
            Request::ThreadSet { .. } => &[Word::ThreadSet],
            Request::CurrentStack => &[Word::CurrentStack],
            Request::Ping => &[Word::Ok],
            _ => &[],
        }
    }

    pub fn into_message(self) -> Message {
        let word = self.word();
        let payload = match self {
            Request::Load {
                working_directory,
                program,
                args,
                trace_stdlib,
            } => format!(
                "{}|{}|{}|{}",
                working_directory.display(),
                program.display(),
                serde_json::Value::from(args),
                flag(trace_stdlib)
            ),
            Request::Continue { special } => flag(special).to_string(),
            Request::Step
            | Request::StepOver
            | Request::StepOut
            | Request::StepQuit
            | Request::ThreadList
            | Request::Shutdown
            | Request::CurrentStack
            | Request::Ping => String::new(),
            Request::Break {
                file,
                line,
                temporary,
                set,
                condition,
            } => format!(
                "{file}@@{line}@@{}@@{}@@{}",
                flag(temporary),
                flag(set),
                condition.as_deref().unwrap_or("None")
            ),
            Request::EnableBreak { file, line, enable } => {
                format!("{file},{line},{}", flag(enable))
            }
            Request::IgnoreBreak { file, line, count } => format!("{file},{line},{count}"),
            Request::Watch {
                condition,
                temporary,
                set,
            } => format!("{condition}@@{}@@{}", flag(temporary), flag(set)),
            Request::EnableWatch { condition, enable } => {
                format!("{condition},{}", flag(enable))
            }
            Request::IgnoreWatch { condition, count } => format!("{condition},{count}"),
            Request::Variables { frame, scope } => format!("{frame},{}", scope.code()),
            Request::Variable { name, frame, scope } => {
                serde_json::json!([name, frame, scope.code()]).to_string()
            }
            Request::ThreadSet { thread } => thread.to_string(),
            Request::Eval { frame, expression } => format!("{frame},{expression}"),
            Request::Exec { frame, statement } => format!("{frame},{statement}"),
            Request::ForkTo(target) => target.as_str().to_string(),
        };
        Message { word, payload }
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        value.into_message()
    }
}

/// Parse a request as a debuggee would.
impl TryFrom<Message> for Request {
    type Error = ProtocolError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let word = message.word;
        let payload = message.payload.as_str();
        let err = |reason: &str| ProtocolError::payload(word, reason);

        let request = match word {
            Word::Load => {
                let mut parts = payload.splitn(4, '|');
                let (Some(wd), Some(program), Some(args), Some(trace)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(err("expected workdir|file|args|trace"));
                };
                Request::Load {
                    working_directory: wd.into(),
                    program: program.into(),
                    args: serde_json::from_str(args).map_err(|e| err(&e.to_string()))?,
                    trace_stdlib: parse_flag(trace).ok_or_else(|| err("bad trace flag"))?,
                }
            }
            Word::Continue => Request::Continue {
                special: parse_flag(payload).ok_or_else(|| err("bad special flag"))?,
            },
            Word::Step => Request::Step,
            Word::StepOver => Request::StepOver,
            Word::StepOut => Request::StepOut,
            Word::StepQuit => Request::StepQuit,
            Word::Break => {
                let parts: Vec<&str> = payload.splitn(5, "@@").collect();
                let &[file, line, temporary, set, condition] = parts.as_slice() else {
                    return Err(err("expected file@@line@@temp@@set@@condition"));
                };
                Request::Break {
                    file: file.to_string(),
                    line: parse_num(line).ok_or_else(|| err("bad line"))?,
                    temporary: parse_flag(temporary).ok_or_else(|| err("bad temporary flag"))?,
                    set: parse_flag(set).ok_or_else(|| err("bad set flag"))?,
                    condition: (condition != "None" && !condition.is_empty())
                        .then(|| condition.to_string()),
                }
            }
            Word::EnableBreak | Word::IgnoreBreak => {
                let mut parts = payload.rsplitn(3, ',');
                let (Some(last), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(err("expected file,line,value"));
                };
                let file = file.to_string();
                let line = parse_num(line).ok_or_else(|| err("bad line"))?;
                if word == Word::EnableBreak {
                    Request::EnableBreak {
                        file,
                        line,
                        enable: parse_flag(last).ok_or_else(|| err("bad enable flag"))?,
                    }
                } else {
                    Request::IgnoreBreak {
                        file,
                        line,
                        count: parse_num(last).ok_or_else(|| err("bad count"))?,
                    }
                }
            }
            Word::Watch => {
                let mut parts = payload.rsplitn(3, "@@");
                let (Some(set), Some(temporary), Some(condition)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(err("expected condition@@temp@@set"));
                };
                Request::Watch {
                    condition: condition.to_string(),
                    temporary: parse_flag(temporary).ok_or_else(|| err("bad temporary flag"))?,
                    set: parse_flag(set).ok_or_else(|| err("bad set flag"))?,
                }
            }
            Word::EnableWatch | Word::IgnoreWatch => {
                let Some((condition, last)) = payload.rsplit_once(',') else {
                    return Err(err("expected condition,value"));
                };
                let condition = condition.to_string();
                if word == Word::EnableWatch {
                    Request::EnableWatch {
                        condition,
                        enable: parse_flag(last).ok_or_else(|| err("bad enable flag"))?,
                    }
                } else {
                    Request::IgnoreWatch {
                        condition,
                        count: parse_num(last).ok_or_else(|| err("bad count"))?,
                    }
                }
            }
            Word::Variables => {
                let (frame, scope) = payload
                    .split_once(',')
                    .ok_or_else(|| err("expected frame,scope"))?;
                Request::Variables {
                    frame: parse_num(frame).ok_or_else(|| err("bad frame"))?,
                    scope: parse_scope(scope).ok_or_else(|| err("bad scope"))?,
                }
            }
            Word::Variable => {
                let (name, frame, scope): (String, u32, i8) =
                    serde_json::from_str(payload).map_err(|e| err(&e.to_string()))?;
                Request::Variable {
                    name,
                    frame,
                    scope: Scope::try_from(scope).map_err(|e| err(&e))?,
                }
            }
            Word::ThreadList => Request::ThreadList,
            Word::ThreadSet => Request::ThreadSet {
                thread: parse_num(payload).ok_or_else(|| err("bad thread id"))?,
            },
            Word::Eval | Word::Exec => {
                let (frame, text) = payload
                    .split_once(',')
                    .ok_or_else(|| err("expected frame,text"))?;
                let frame = parse_num(frame).ok_or_else(|| err("bad frame"))?;
                let text = text.trim_start().to_string();
                if word == Word::Eval {
                    Request::Eval {
                        frame,
                        expression: text,
                    }
                } else {
                    Request::Exec {
                        frame,
                        statement: text,
                    }
                }
            }
            Word::Shutdown => Request::Shutdown,
            Word::ForkTo => match payload.trim() {
                "parent" => Request::ForkTo(ForkTarget::Parent),
                "child" => Request::ForkTo(ForkTarget::Child),
                _ => return Err(err("expected parent or child")),
            },
            Word::CurrentStack => Request::CurrentStack,
            Word::Ok => Request::Ping,
            _ => return Err(err("not a request")),
        };
        Ok(request)
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "True" | "true" => Some(true),
        "0" | "False" | "false" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_num<T: std::str::FromStr>(s: &str) -> Option<T> {
    s.trim().parse().ok()
}

fn parse_scope(s: &str) -> Option<Scope> {
    parse_num::<i8>(s).and_then(|code| Scope::try_from(code).ok())
}
