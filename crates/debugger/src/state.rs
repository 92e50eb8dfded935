use std::fmt;

use transport::Word;
use transport::types::{
    ExceptionReport, RawInput, Stack, SyntaxErrorInfo, ThreadList, VariableList,
};

use crate::error::SessionError;

/// Lifecycle of a session with one debuggee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected, no program loaded yet.
    Idle,
    /// A program was requested and has not reported back.
    Connecting,
    Running,
    Stopped,
    Exited,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Exited | SessionState::Disconnected)
    }

    /// Whether the debuggee is loaded and can take breakpoint changes.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Exited => "exited",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Decides which words may be sent and how traffic moves the session
/// between states
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Reject requests that make no sense in the current state before they
    /// reach the wire.
    pub(crate) fn check_send(&self, word: Word) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminated(self.state));
        }
        let allowed = match word {
            Word::Load => self.state == SessionState::Idle,
            word if word.requires_stopped() => self.state == SessionState::Stopped,
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                word,
                state: self.state,
            })
        }
    }

    fn move_to(&mut self, to: SessionState) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to,
        };
        tracing::debug!(from = %transition.from, to = %transition.to, "session state change");
        self.state = to;
        Some(transition)
    }

    pub(crate) fn on_sent(&mut self, word: Word) -> Option<Transition> {
        use SessionState::*;

        match (self.state, word) {
            (Idle, Word::Load) => self.move_to(Connecting),
            (Stopped, word) if word.resumes() => self.move_to(Running),
            _ => None,
        }
    }

    pub(crate) fn on_received(&mut self, word: Word) -> Option<Transition> {
        use SessionState::*;

        match (self.state, word) {
            (state, _) if state.is_terminal() => None,
            (Idle | Connecting, Word::PassiveStartup) => self.move_to(Running),
            (Connecting, Word::Ok) => self.move_to(Running),
            (Connecting | Running, Word::Line | Word::Exception) => self.move_to(Stopped),
            (_, Word::Exit) => self.move_to(Exited),
            _ => None,
        }
    }

    pub(crate) fn on_disconnect(&mut self) -> Option<Transition> {
        if self.state.is_terminal() {
            None
        } else {
            self.move_to(SessionState::Disconnected)
        }
    }
}

/// Events published to collaborators of a [`Session`](crate::Session)
#[derive(Debug, Clone)]
pub enum Event {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A debuggee connected on its own and is ready for breakpoints.
    Started { file: String, pid: Option<u32> },
    /// The debuggee stopped; innermost frame first.
    Stopped { stack: Stack },
    /// Reply to a stack request.
    Stack(Stack),
    /// Text the debuggee wrote outside of protocol messages.
    Output(String),
    Exception(ExceptionReport),
    ExceptionIgnored { type_name: String, count: u64 },
    SyntaxError(SyntaxErrorInfo),
    EvalResult {
        /// The expression this answers, when the request is still known.
        expression: Option<String>,
        result: String,
        error: bool,
    },
    ExecResult {
        statement: Option<String>,
        error: Option<String>,
    },
    ThreadList(ThreadList),
    ThreadSet { thread: Option<i64> },
    Variables(VariableList),
    BreakpointCleared { file: String, line: u32 },
    BreakpointConditionError { file: String, line: u32 },
    WatchpointCleared { condition: String },
    WatchpointConditionError { condition: String },
    /// The debuggee is forking and waits for a `ForkTo` answer.
    ForkRequested,
    RawInput(RawInput),
    Exited { code: i32 },
    Disconnected { reason: String },
}

impl From<Transition> for Event {
    fn from(Transition { from, to }: Transition) -> Self {
        Event::StateChanged { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(state: SessionState) -> StateMachine {
        StateMachine { state }
    }

    #[test]
    fn load_then_passive_startup() {
        let mut machine = StateMachine::new();
        machine.check_send(Word::Load).unwrap();
        assert_eq!(
            machine.on_sent(Word::Load),
            Some(Transition {
                from: SessionState::Idle,
                to: SessionState::Connecting
            })
        );
        assert!(matches!(
            machine.check_send(Word::Load),
            Err(SessionError::InvalidState { .. })
        ));
        machine.on_received(Word::PassiveStartup);
        assert_eq!(machine.state(), SessionState::Running);
    }

    #[test]
    fn ok_completes_connecting() {
        let mut machine = machine_in(SessionState::Connecting);
        machine.on_received(Word::Ok);
        assert_eq!(machine.state(), SessionState::Running);

        // a liveness reply changes nothing later on
        assert_eq!(machine.on_received(Word::Ok), None);
    }

    #[test]
    fn passive_debuggee_from_idle() {
        let mut machine = StateMachine::new();
        machine.on_received(Word::PassiveStartup);
        assert_eq!(machine.state(), SessionState::Running);
    }

    #[test]
    fn stop_and_resume() {
        let mut machine = machine_in(SessionState::Running);
        machine.on_received(Word::Line);
        assert_eq!(machine.state(), SessionState::Stopped);

        for word in [Word::Continue, Word::Step, Word::StepOver, Word::StepOut, Word::StepQuit] {
            let mut machine = machine_in(SessionState::Stopped);
            machine.check_send(word).unwrap();
            machine.on_sent(word);
            assert_eq!(machine.state(), SessionState::Running, "{word}");
        }
    }

    #[test]
    fn exception_stops() {
        let mut machine = machine_in(SessionState::Running);
        machine.on_received(Word::Exception);
        assert_eq!(machine.state(), SessionState::Stopped);
    }

    #[test]
    fn stopped_only_words_rejected_while_running() {
        let machine = machine_in(SessionState::Running);
        for word in [
            Word::Variables,
            Word::Variable,
            Word::Eval,
            Word::Exec,
            Word::ThreadSet,
            Word::ThreadList,
            Word::CurrentStack,
            Word::Continue,
            Word::Step,
        ] {
            assert!(
                matches!(
                    machine.check_send(word),
                    Err(SessionError::InvalidState {
                        state: SessionState::Running,
                        ..
                    })
                ),
                "{word}"
            );
        }
        machine.check_send(Word::Break).unwrap();
        machine.check_send(Word::Shutdown).unwrap();
    }

    #[test]
    fn terminal_states() {
        let mut machine = machine_in(SessionState::Stopped);
        machine.on_received(Word::Exit);
        assert_eq!(machine.state(), SessionState::Exited);
        assert!(matches!(
            machine.check_send(Word::Shutdown),
            Err(SessionError::Terminated(SessionState::Exited))
        ));
        assert_eq!(machine.on_disconnect(), None);
        assert_eq!(machine.on_received(Word::Line), None);

        let mut machine = machine_in(SessionState::Running);
        machine.on_disconnect();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert!(machine.check_send(Word::Ok).is_err());
    }
}
