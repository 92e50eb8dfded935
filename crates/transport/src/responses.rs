//! Messages sent by a debuggee, in reply to [`crate::requests`] or on its own
use serde::Serialize;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::requests::parse_num;
use crate::types::{
    ExceptionReport, RawInput, Stack, SyntaxErrorInfo, ThreadList, VariableList,
};
use crate::word::Word;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Generic acknowledgement, also the answer to a liveness probe.
    Ok,
    /// The debuggee stopped; innermost frame first.
    Line(Stack),
    /// Answer to a stack request, no state change.
    CurrentStack(Stack),
    Exception(ExceptionReport),
    SyntaxError(SyntaxErrorInfo),
    Exit(i32),
    /// The program is waiting for console input.
    Raw(RawInput),
    /// A temporary breakpoint was consumed.
    ClearBreak { file: String, line: u32 },
    BPConditionError { file: String, line: u32 },
    /// A temporary watchpoint was consumed.
    ClearWatch { condition: String },
    WPConditionError { condition: String },
    /// The evaluation started.
    Eval,
    EvalOK(String),
    EvalError(String),
    /// The statement was executed.
    Exec,
    ExecError(String),
    ThreadList(ThreadList),
    ThreadSet,
    Variables(VariableList),
    /// Members of one expanded variable.
    Variable(VariableList),
    /// A debuggee that connected on its own is ready for breakpoints.
    PassiveStartup { file: String, pid: Option<u32> },
    /// The debuggee is about to fork and asks which side to follow.
    ForkTo,
    Eot,
}

impl Response {
    pub fn word(&self) -> Word {
        match self {
            Response::Ok => Word::Ok,
            Response::Line(_) => Word::Line,
            Response::CurrentStack(_) => Word::CurrentStack,
            Response::Exception(_) => Word::Exception,
            Response::SyntaxError(_) => Word::SyntaxError,
            Response::Exit(_) => Word::Exit,
            Response::Raw(_) => Word::Raw,
            Response::ClearBreak { .. } => Word::ClearBreak,
            Response::BPConditionError { .. } => Word::BPConditionError,
            Response::ClearWatch { .. } => Word::ClearWatch,
            Response::WPConditionError { .. } => Word::WPConditionError,
            Response::Eval => Word::Eval,
            Response::EvalOK(_) => Word::EvalOK,
            Response::EvalError(_) => Word::EvalError,
            Response::Exec => Word::Exec,
            Response::ExecError(_) => Word::ExecError,
            Response::ThreadList(_) => Word::ThreadList,
            Response::ThreadSet => Word::ThreadSet,
            Response::Variables(_) => Word::Variables,
            Response::Variable(_) => Word::Variable,
            Response::PassiveStartup { .. } => Word::PassiveStartup,
            Response::ForkTo => Word::ForkTo,
            Response::Eot => Word::Eot,
        }
    }

    /// Encode as a debuggee would send it.
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let word = self.word();
        let payload = match self {
            Response::Ok
            | Response::Eval
            | Response::Exec
            | Response::ThreadSet
            | Response::ForkTo
            | Response::Eot => String::new(),
            Response::Line(stack) | Response::CurrentStack(stack) => to_json(word, &stack)?,
            Response::Exception(report) => to_json(word, &report)?,
            Response::SyntaxError(info) => to_json(word, &info)?,
            Response::Exit(code) => code.to_string(),
            Response::Raw(raw) => to_json(word, &raw)?,
            Response::ClearBreak { file, line } | Response::BPConditionError { file, line } => {
                format!("{file},{line}")
            }
            Response::ClearWatch { condition } | Response::WPConditionError { condition } => {
                condition
            }
            Response::EvalOK(text) | Response::EvalError(text) | Response::ExecError(text) => text,
            Response::ThreadList(list) => to_json(word, &list)?,
            Response::Variables(list) | Response::Variable(list) => to_json(word, &list)?,
            Response::PassiveStartup { file, pid } => match pid {
                Some(pid) => format!("{file}|{pid}"),
                None => file,
            },
        };
        Ok(Message { word, payload })
    }
}

impl TryFrom<Message> for Response {
    type Error = ProtocolError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let Message { word, payload } = message;
        let err = |reason: &str| ProtocolError::payload(word, reason);

        let response = match word {
            Word::Ok => Response::Ok,
            Word::Line => Response::Line(from_json(word, &payload)?),
            Word::CurrentStack => Response::CurrentStack(from_json(word, &payload)?),
            Word::Exception => Response::Exception(from_json(word, &payload)?),
            Word::SyntaxError => Response::SyntaxError(from_json(word, &payload)?),
            Word::Exit => {
                let code = if payload.trim().is_empty() {
                    0
                } else {
                    parse_num(&payload).ok_or_else(|| err("exit code is not an integer"))?
                };
                Response::Exit(code)
            }
            Word::Raw => Response::Raw(from_json(word, &payload)?),
            Word::ClearBreak | Word::BPConditionError => {
                let (file, line) = payload
                    .rsplit_once(',')
                    .ok_or_else(|| err("expected file,line"))?;
                let file = file.to_string();
                let line = parse_num(line).ok_or_else(|| err("bad line number"))?;
                if word == Word::ClearBreak {
                    Response::ClearBreak { file, line }
                } else {
                    Response::BPConditionError { file, line }
                }
            }
            Word::ClearWatch => Response::ClearWatch { condition: payload },
            Word::WPConditionError => Response::WPConditionError { condition: payload },
            Word::Eval => Response::Eval,
            Word::EvalOK => Response::EvalOK(payload),
            Word::EvalError => Response::EvalError(payload),
            Word::Exec => Response::Exec,
            Word::ExecError => Response::ExecError(payload),
            Word::ThreadList => Response::ThreadList(from_json(word, &payload)?),
            Word::ThreadSet => Response::ThreadSet,
            Word::Variables => Response::Variables(from_json(word, &payload)?),
            Word::Variable => Response::Variable(from_json(word, &payload)?),
            Word::PassiveStartup => match payload.rsplit_once('|') {
                Some((file, pid)) => Response::PassiveStartup {
                    file: file.to_string(),
                    pid: Some(parse_num(pid).ok_or_else(|| err("bad process id"))?),
                },
                None => Response::PassiveStartup {
                    file: payload,
                    pid: None,
                },
            },
            Word::ForkTo => Response::ForkTo,
            Word::Eot => Response::Eot,
            other => return Err(err(&format!("{other} is not sent by a debuggee"))),
        };
        Ok(response)
    }
}

fn from_json<T: serde::de::DeserializeOwned>(word: Word, payload: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|e| ProtocolError::payload(word, e))
}

fn to_json<T: Serialize>(word: Word, value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(|e| ProtocolError::payload(word, e))
}
