use std::path::Path;

use transport::types::{ExceptionReport, Stack};
use transport::{Frame, ProtocolError, Request, Response, Word};

use crate::Event;
use crate::error::SessionError;
use crate::exceptions::{Delivery, ExceptionChannel};
use crate::pending_requests::PendingRequests;
use crate::registry::{PointKey, Registry};
use crate::state::{SessionState, StateMachine, Transition};

/// Everything about a session that the worker thread and the session handle
/// share
pub(crate) struct SessionInternals {
    machine: StateMachine,
    pub(crate) registry: Registry,
    pub(crate) exceptions: ExceptionChannel,
    pending: PendingRequests,
    publisher: crossbeam_channel::Sender<Event>,

    pub(crate) current_thread: Option<i64>,
    pub(crate) last_stack: Option<Stack>,
    pub(crate) exit_code: Option<i32>,
}

impl SessionInternals {
    pub(crate) fn new(
        publisher: crossbeam_channel::Sender<Event>,
        exceptions: ExceptionChannel,
    ) -> Self {
        Self {
            machine: StateMachine::new(),
            registry: Registry::new(),
            exceptions,
            pending: PendingRequests::new(),
            publisher,
            current_thread: None,
            last_stack: None,
            exit_code: None,
        }
    }

    pub(crate) fn emit(&mut self, event: Event) {
        let _ = self.publisher.send(event);
    }

    fn transition(&mut self, transition: Option<Transition>) {
        if let Some(transition) = transition {
            self.emit(transition.into());
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub(crate) fn last_exception(&self) -> Option<&ExceptionReport> {
        self.exceptions.last()
    }

    pub(crate) fn check_send(&self, request: &Request) -> Result<(), SessionError> {
        self.machine.check_send(request.word())
    }

    /// Book-keeping after `request` was written to the debuggee.
    pub(crate) fn on_sent(&mut self, request: Request) {
        let transition = self.machine.on_sent(request.word());
        if transition.is_some_and(|t| t.to == SessionState::Running) {
            self.last_stack = None;
            self.exceptions.clear_last();
        }
        self.transition(transition);

        // liveness replies are not matched; any inbound frame answers them
        if request != Request::Ping {
            self.pending.push(request);
        }
    }

    /// Requests that recreate every known breakpoint and watchpoint in the
    /// debuggee.
    pub(crate) fn sync_requests(&self) -> Vec<Request> {
        self.registry
            .breakpoints()
            .flat_map(|breakpoint| breakpoint.sync_requests())
            .chain(
                self.registry
                    .watchpoints()
                    .flat_map(|watchpoint| watchpoint.sync_requests()),
            )
            .collect()
    }

    /// Handle one inbound frame, returning follow-up requests to send.
    pub(crate) fn on_frame(&mut self, frame: Frame) -> Result<Vec<Request>, ProtocolError> {
        match frame {
            Frame::Output(text) => {
                self.emit(Event::Output(text));
                Ok(Vec::new())
            }
            Frame::Message(message) => {
                let response = Response::try_from(message)?;
                Ok(self.on_response(response))
            }
        }
    }

    fn on_response(&mut self, response: Response) -> Vec<Request> {
        let word = response.word();
        tracing::debug!(%word, pending = self.pending.len(), "handling response");
        let transition = self.machine.on_received(word);
        let started = matches!(
            transition,
            Some(Transition {
                from: SessionState::Idle | SessionState::Connecting,
                to: SessionState::Running | SessionState::Stopped,
            })
        );
        self.transition(transition);

        let mut follow_ups = Vec::new();
        match response {
            Response::Ok => {}
            Response::Line(stack) => {
                self.last_stack = Some(stack.clone());
                self.emit(Event::Stopped { stack });
            }
            Response::CurrentStack(stack) => {
                self.take_pending(word);
                self.last_stack = Some(stack.clone());
                self.emit(Event::Stack(stack));
            }
            Response::Exception(report) => match self.exceptions.receive(report) {
                Delivery::Report(report) => self.emit(Event::Exception(report)),
                Delivery::Ignored { type_name, count } => {
                    self.emit(Event::ExceptionIgnored { type_name, count });
                    if self.state() == SessionState::Stopped {
                        follow_ups.push(Request::Continue { special: false });
                    }
                }
            },
            Response::SyntaxError(info) => self.emit(Event::SyntaxError(info)),
            Response::Exit(code) => {
                self.exit_code = Some(code);
                self.pending.clear();
                self.emit(Event::Exited { code });
            }
            Response::Raw(prompt) => self.emit(Event::RawInput(prompt)),
            Response::ClearBreak { file, line } => {
                self.registry.remove_breakpoint(Path::new(&file), line);
                self.emit(Event::BreakpointCleared { file, line });
            }
            Response::BPConditionError { file, line } => {
                let key = PointKey::Breakpoint {
                    file: file.clone().into(),
                    line,
                };
                if self.registry.note_condition_error(key) {
                    self.emit(Event::BreakpointConditionError { file, line });
                }
            }
            Response::ClearWatch { condition } => {
                self.registry.remove_watchpoint(&condition);
                self.emit(Event::WatchpointCleared { condition });
            }
            Response::WPConditionError { condition } => {
                let key = PointKey::Watchpoint(
                    crate::Watchpoint::condition_from_wire(&condition).to_string(),
                );
                if self.registry.note_condition_error(key) {
                    self.emit(Event::WatchpointConditionError { condition });
                }
            }
            Response::Eval => tracing::trace!("evaluation started"),
            Response::EvalOK(result) | Response::EvalError(result) => {
                let expression = match self.take_pending(word) {
                    Some(Request::Eval { expression, .. }) => Some(expression),
                    _ => None,
                };
                self.emit(Event::EvalResult {
                    expression,
                    result,
                    error: word == Word::EvalError,
                });
            }
            Response::Exec => {
                let statement = self.take_statement(word);
                self.emit(Event::ExecResult {
                    statement,
                    error: None,
                });
            }
            Response::ExecError(error) => {
                let statement = self.take_statement(word);
                self.emit(Event::ExecResult {
                    statement,
                    error: Some(error),
                });
            }
            Response::ThreadList(list) => {
                self.take_pending(word);
                self.current_thread = Some(list.current);
                self.emit(Event::ThreadList(list));
            }
            Response::ThreadSet => {
                let thread = match self.take_pending(word) {
                    Some(Request::ThreadSet { thread }) => Some(thread),
                    _ => None,
                };
                if thread.is_some() {
                    self.current_thread = thread;
                }
                self.emit(Event::ThreadSet { thread });
            }
            Response::Variables(variables) | Response::Variable(variables) => {
                self.take_pending(word);
                self.emit(Event::Variables(variables));
            }
            Response::PassiveStartup { file, pid } => {
                tracing::info!(%file, ?pid, "debuggee started");
                self.emit(Event::Started { file, pid });
            }
            Response::ForkTo => self.emit(Event::ForkRequested),
            Response::Eot => tracing::debug!("debuggee finished sending"),
        }

        // a freshly started debuggee knows nothing about our points
        if started {
            follow_ups.extend(self.sync_requests());
        }
        follow_ups
    }

    fn take_pending(&mut self, word: Word) -> Option<Request> {
        let pending = self.pending.take(word);
        if pending.is_none() {
            tracing::warn!(%word, "reply without a matching request");
        }
        pending.map(|pending| pending.request)
    }

    fn take_statement(&mut self, word: Word) -> Option<String> {
        match self.take_pending(word) {
            Some(Request::Exec { statement, .. }) => Some(statement),
            _ => None,
        }
    }

    /// The connection is gone; nothing pending will be answered.
    pub(crate) fn on_disconnect(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.pending.is_empty() {
            tracing::debug!(count = self.pending.len(), "dropping unanswered requests");
        }
        self.pending.clear();
        let transition = self.machine.on_disconnect();
        if transition.is_some() {
            tracing::warn!(%reason, "session disconnected");
            self.transition(transition);
            self.emit(Event::Disconnected { reason });
        }
    }
}
