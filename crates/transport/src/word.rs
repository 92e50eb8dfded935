//! The closed protocol vocabulary.
//!
//! Every message starts with one of these words written as `>Word<`. Some
//! words are used in both directions; which role a message plays is decided by
//! who sent it.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// A protocol word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Word {
    // requests
    Load,
    Continue,
    Step,
    StepOver,
    StepOut,
    StepQuit,
    Break,
    EnableBreak,
    IgnoreBreak,
    Watch,
    EnableWatch,
    IgnoreWatch,
    Variables,
    Variable,
    ThreadList,
    ThreadSet,
    Eval,
    Exec,
    Shutdown,
    ForkTo,
    CurrentStack,

    // responses
    Ok,
    Exception,
    SyntaxError,
    Exit,
    Line,
    Raw,
    ClearBreak,
    BPConditionError,
    ClearWatch,
    WPConditionError,
    EvalOK,
    EvalError,
    ExecError,
    PassiveStartup,

    /// End of transmission.
    Eot,
}

/// Longest token in the vocabulary, including the angle brackets.
pub(crate) const MAX_TOKEN_LEN: usize = 20;

impl Word {
    /// All words, in declaration order.
    pub const ALL: [Word; 36] = [
        Word::Load,
        Word::Continue,
        Word::Step,
        Word::StepOver,
        Word::StepOut,
        Word::StepQuit,
        Word::Break,
        Word::EnableBreak,
        Word::IgnoreBreak,
        Word::Watch,
        Word::EnableWatch,
        Word::IgnoreWatch,
        Word::Variables,
        Word::Variable,
        Word::ThreadList,
        Word::ThreadSet,
        Word::Eval,
        Word::Exec,
        Word::Shutdown,
        Word::ForkTo,
        Word::CurrentStack,
        Word::Ok,
        Word::Exception,
        Word::SyntaxError,
        Word::Exit,
        Word::Line,
        Word::Raw,
        Word::ClearBreak,
        Word::BPConditionError,
        Word::ClearWatch,
        Word::WPConditionError,
        Word::EvalOK,
        Word::EvalError,
        Word::ExecError,
        Word::PassiveStartup,
        Word::Eot,
    ];

    /// The bare name, without angle brackets.
    pub fn name(self) -> &'static str {
        match self {
            Word::Load => "Load",
            Word::Continue => "Continue",
            Word::Step => "Step",
            Word::StepOver => "StepOver",
            Word::StepOut => "StepOut",
            Word::StepQuit => "StepQuit",
            Word::Break => "Break",
            Word::EnableBreak => "EnableBreak",
            Word::IgnoreBreak => "IgnoreBreak",
            Word::Watch => "Watch",
            Word::EnableWatch => "EnableWatch",
            Word::IgnoreWatch => "IgnoreWatch",
            Word::Variables => "Variables",
            Word::Variable => "Variable",
            Word::ThreadList => "ThreadList",
            Word::ThreadSet => "ThreadSet",
            Word::Eval => "Eval",
            Word::Exec => "Exec",
            Word::Shutdown => "Shutdown",
            Word::ForkTo => "ForkTo",
            Word::CurrentStack => "CurrentStack",
            Word::Ok => "OK",
            Word::Exception => "Exception",
            Word::SyntaxError => "SyntaxError",
            Word::Exit => "Exit",
            Word::Line => "Line",
            Word::Raw => "Raw",
            Word::ClearBreak => "ClearBreak",
            Word::BPConditionError => "BPConditionError",
            Word::ClearWatch => "ClearWatch",
            Word::WPConditionError => "WPConditionError",
            Word::EvalOK => "EvalOK",
            Word::EvalError => "EvalError",
            Word::ExecError => "ExecError",
            Word::PassiveStartup => "PassiveStartup",
            Word::Eot => "EOT",
        }
    }

    /// The wire token, e.g. `>Line<`.
    pub fn token(self) -> String {
        format!(">{}<", self.name())
    }

    /// Look a word up by its bare name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|w| w.name() == name)
    }

    /// Whether the IDE may send this word.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Word::Load
                | Word::Continue
                | Word::Step
                | Word::StepOver
                | Word::StepOut
                | Word::StepQuit
                | Word::Break
                | Word::EnableBreak
                | Word::IgnoreBreak
                | Word::Watch
                | Word::EnableWatch
                | Word::IgnoreWatch
                | Word::Variables
                | Word::Variable
                | Word::ThreadList
                | Word::ThreadSet
                | Word::Eval
                | Word::Exec
                | Word::Shutdown
                | Word::ForkTo
                | Word::CurrentStack
                | Word::Ok
        )
    }

    /// Whether the debuggee may send this word.
    pub fn is_response(self) -> bool {
        !self.is_request() || self.is_symmetric() || self == Word::Ok
    }

    /// Words that use the same token for the request and its reply.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            Word::Variables
                | Word::ThreadList
                | Word::ThreadSet
                | Word::CurrentStack
                | Word::ForkTo
                | Word::Eval
                | Word::Exec
        )
    }

    /// Requests that inspect or resume a paused debuggee and therefore make
    /// no sense unless the session is stopped.
    pub fn requires_stopped(self) -> bool {
        matches!(
            self,
            Word::Variables
                | Word::Variable
                | Word::Eval
                | Word::Exec
                | Word::ThreadSet
                | Word::ThreadList
                | Word::CurrentStack
                | Word::Continue
                | Word::Step
                | Word::StepOver
                | Word::StepOut
                | Word::StepQuit
        )
    }

    /// Requests that hand control back to the debuggee.
    pub fn resumes(self) -> bool {
        matches!(
            self,
            Word::Continue | Word::Step | Word::StepOver | Word::StepOut | Word::StepQuit
        )
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Word {
    type Err = ProtocolError;

    /// Accepts either the bare name or the bracketed token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s
            .strip_prefix('>')
            .and_then(|s| s.strip_suffix('<'))
            .unwrap_or(s);
        Word::from_name(name).ok_or_else(|| ProtocolError::UnknownWord(name.to_string()))
    }
}
