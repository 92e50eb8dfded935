//! Structured payloads carried as JSON by some protocol messages.
use serde::{Deserialize, Serialize};

/// One frame of a call stack, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Formatted argument values, as the debuggee renders them.
    #[serde(default)]
    pub arguments: String,
}

/// A stack as sent with `Line` and `CurrentStack`.
pub type Stack = Vec<StackFrame>;

/// An exception raised in the debuggee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionReport {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: Stack,
}

impl ExceptionReport {
    /// Exceptions raised inside an evaluated expression report a synthetic
    /// `<string>` frame on top; such a stack does not point at user code.
    pub fn raised_in_eval(&self) -> bool {
        self.stack
            .first()
            .is_some_and(|frame| frame.file == "<string>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxErrorInfo {
    pub message: String,
    #[serde(rename = "filename", default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(rename = "characternumber", default)]
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadState {
    Running,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
    pub state: ThreadState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadList {
    /// Id of the thread the debugger is currently attached to.
    pub current: i64,
    pub threads: Vec<ThreadInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

/// Which namespace a variables request looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Scope {
    /// Frame locals.
    Local,
    /// Module globals.
    Global,
    /// Locals and globals are the same namespace, nothing separate to show.
    Shared,
}

impl Scope {
    pub fn code(self) -> i8 {
        match self {
            Scope::Local => 0,
            Scope::Global => 1,
            Scope::Shared => -1,
        }
    }
}

impl From<Scope> for i8 {
    fn from(value: Scope) -> Self {
        value.code()
    }
}

impl TryFrom<i8> for Scope {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Scope::Local),
            1 => Ok(Scope::Global),
            -1 => Ok(Scope::Shared),
            other => Err(format!("invalid scope {other}")),
        }
    }
}

/// Reply to `Variables` and `Variable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableList {
    pub scope: Scope,
    /// The variable that was expanded, for replies to `Variable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// The debuggee is blocked reading from stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub prompt: String,
    pub echo: bool,
}
