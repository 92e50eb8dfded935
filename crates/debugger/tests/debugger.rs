//! Scenario tests driving a [`Session`] against a scripted debuggee.

mod common;

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use transport::types::{ExceptionReport, StackFrame};
use transport::{Request, Response, TcpTransport, Transport, Writer};

use common::FakeDebuggee;
use debugger::{Breakpoint, Event, Session, SessionConfig, SessionError, SessionState, Watchpoint};

const TIMEOUT: Duration = Duration::from_secs(5);

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

/// Waits for session events, buffering the ones a test is not interested in
struct Events {
    rx: crossbeam_channel::Receiver<Event>,
    buffer: VecDeque<Event>,
}

impl Events {
    fn new(session: &Session) -> Self {
        Self {
            rx: session.events(),
            buffer: VecDeque::new(),
        }
    }

    #[tracing::instrument(skip(self, pred))]
    fn wait_for<F>(&mut self, message: &str, pred: F) -> Event
    where
        F: Fn(&Event) -> bool,
    {
        tracing::debug!("waiting for {message} event");
        if let Some(pos) = self.buffer.iter().position(&pred) {
            if let Some(event) = self.buffer.remove(pos) {
                return event;
            }
        }

        loop {
            let event = match self.rx.recv_timeout(TIMEOUT) {
                Ok(event) => event,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    panic!("timeout waiting for {message} event");
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    panic!("channel disconnected while waiting for {message} event");
                }
            };
            if pred(&event) {
                tracing::debug!(?event, "received expected event");
                return event;
            }
            tracing::trace!(?event, "non-matching event, buffering for later");
            self.buffer.push_back(event);
        }
    }

    fn wait_for_state(&mut self, state: SessionState) {
        self.wait_for(&state.to_string(), |event| {
            matches!(event, Event::StateChanged { to, .. } if *to == state)
        });
    }
}

fn quiet_config() -> SessionConfig {
    SessionConfig {
        ping_interval: Duration::from_secs(60),
        ping_timeout: Duration::from_secs(60),
        shutdown_timeout: Duration::from_millis(200),
        ..SessionConfig::default()
    }
}

fn stack(line: u32) -> Vec<StackFrame> {
    vec![StackFrame {
        file: "/work/main.py".to_string(),
        line,
        function: "<module>".to_string(),
        arguments: String::new(),
    }]
}

fn startup() -> Response {
    Response::PassiveStartup {
        file: "/work/main.py".to_string(),
        pid: Some(4321),
    }
}

fn running_session(config: SessionConfig) -> (Session, FakeDebuggee, Events) {
    let (session, debuggee) = FakeDebuggee::pair(config).unwrap();
    let mut events = Events::new(&session);
    debuggee.send(startup()).unwrap();
    events.wait_for_state(SessionState::Running);
    (session, debuggee, events)
}

#[test]
fn full_lifecycle() {
    let (session, debuggee) = FakeDebuggee::pair(quiet_config()).unwrap();
    let mut events = Events::new(&session);
    assert_eq!(session.state(), SessionState::Idle);

    session.load("/work", "/work/main.py", vec!["--fast".to_string()]).unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Load { ref args, .. } if args == &["--fast".to_string()]
    ));
    assert_eq!(session.state(), SessionState::Connecting);

    debuggee.send(startup()).unwrap();
    events.wait_for("started", |event| {
        matches!(event, Event::Started { pid: Some(4321), .. })
    });

    debuggee.send(Response::Line(stack(3))).unwrap();
    events.wait_for("stopped", |event| matches!(event, Event::Stopped { .. }));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.last_stack().unwrap()[0].line, 3);

    session.evaluate(0, "x + 1").unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Eval { ref expression, .. } if expression == "x + 1"
    ));
    debuggee.send(Response::Eval).unwrap();
    debuggee.send(Response::EvalOK("2".to_string())).unwrap();
    let result = events.wait_for("eval result", |event| {
        matches!(event, Event::EvalResult { .. })
    });
    assert!(matches!(
        result,
        Event::EvalResult { expression: Some(ref e), ref result, error: false }
            if e == "x + 1" && result == "2"
    ));

    session.r#continue().unwrap();
    assert_eq!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Continue { special: false }
    );
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.last_stack().is_none());

    debuggee.send(Response::Exit(0)).unwrap();
    events.wait_for("exited", |event| matches!(event, Event::Exited { code: 0 }));
    assert_eq!(session.state(), SessionState::Exited);
    assert_eq!(session.exit_code(), Some(0));

    assert!(matches!(
        session.r#continue(),
        Err(SessionError::Terminated(SessionState::Exited))
    ));
}

#[test]
fn stopped_only_requests_rejected_while_running() {
    let (session, debuggee, _events) = running_session(quiet_config());

    assert!(matches!(
        session.evaluate(0, "x"),
        Err(SessionError::InvalidState {
            state: SessionState::Running,
            ..
        })
    ));
    assert!(session.step().is_err());

    thread::sleep(Duration::from_millis(50));
    assert_eq!(debuggee.try_request(), None);
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn points_registered_early_are_sent_on_startup() {
    let (session, debuggee) = FakeDebuggee::pair(quiet_config()).unwrap();
    session
        .register_breakpoint(Breakpoint::new("/work/main.py", 3).with_condition("x > 1"))
        .unwrap();
    session
        .register_watchpoint(Watchpoint::new("total").special(true))
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(debuggee.try_request(), None);

    debuggee.send(startup()).unwrap();
    assert_eq!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Break {
            file: "/work/main.py".to_string(),
            line: 3,
            temporary: false,
            set: true,
            condition: Some("x > 1".to_string()),
        }
    );
    assert_eq!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Watch {
            condition: "total ??changed??".to_string(),
            temporary: false,
            set: true,
        }
    );
}

#[test]
fn points_are_sent_when_debuggee_stops_before_acknowledging_load() {
    let (session, debuggee) = FakeDebuggee::pair(quiet_config()).unwrap();
    let mut events = Events::new(&session);
    session
        .register_breakpoint(Breakpoint::new("/work/main.py", 5))
        .unwrap();

    session.load("/work", "/work/main.py", Vec::new()).unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Load { .. }
    ));

    debuggee.send(Response::Line(stack(1))).unwrap();
    events.wait_for_state(SessionState::Stopped);
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Break { line: 5, set: true, .. }
    ));
}

#[test]
fn unanswered_load_disconnects() {
    let config = SessionConfig {
        ping_timeout: Duration::from_millis(100),
        ..quiet_config()
    };
    let (session, debuggee) = FakeDebuggee::pair(config).unwrap();
    let mut events = Events::new(&session);

    session.load("/work", "/work/main.py", Vec::new()).unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Load { .. }
    ));
    assert_eq!(session.state(), SessionState::Connecting);

    events.wait_for("disconnected", |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn variable_reply_keeps_the_session() {
    let (session, debuggee, mut events) = running_session(quiet_config());
    debuggee.send(Response::Line(stack(2))).unwrap();
    events.wait_for_state(SessionState::Stopped);

    debuggee
        .send_raw(b">Variable<{\"scope\":0,\"variable\":\"obj\",\"variables\":[]}\n")
        .unwrap();
    let event = events.wait_for("variables", |event| matches!(event, Event::Variables(_)));
    assert!(matches!(
        event,
        Event::Variables(ref list) if list.variable.as_deref() == Some("obj")
    ));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn point_changes_reach_a_live_debuggee() {
    let (session, debuggee, _events) = running_session(quiet_config());
    let file = Path::new("/work/main.py");

    session
        .register_breakpoint(Breakpoint::new(file, 7))
        .unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Break { line: 7, set: true, .. }
    ));

    session.enable_breakpoint(file, 7, false).unwrap();
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::EnableBreak { line: 7, enable: false, .. }
    ));

    let removed = session.remove_breakpoint(file, 7).unwrap();
    assert!(removed.is_some());
    assert!(matches!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Break { line: 7, set: false, .. }
    ));
    assert!(session.breakpoints().is_empty());

    assert!(matches!(
        session.enable_breakpoint(file, 7, true),
        Err(SessionError::Registry(_))
    ));
}

#[test]
fn debuggee_clears_temporary_breakpoint() {
    let (session, debuggee, mut events) = running_session(quiet_config());
    session
        .register_breakpoint(Breakpoint::new("/work/main.py", 9).temporary(true))
        .unwrap();
    debuggee.expect_request(TIMEOUT).unwrap();

    debuggee
        .send(Response::ClearBreak {
            file: "/work/main.py".to_string(),
            line: 9,
        })
        .unwrap();
    events.wait_for("breakpoint cleared", |event| {
        matches!(event, Event::BreakpointCleared { line: 9, .. })
    });
    assert!(session.breakpoints().is_empty());
}

#[test]
fn ignored_exception_is_counted_and_resumed() {
    let config = SessionConfig {
        ignored_exceptions: vec!["StopIteration".to_string()],
        ..quiet_config()
    };
    let (session, debuggee, mut events) = running_session(config);

    debuggee
        .send(Response::Exception(ExceptionReport {
            type_name: "StopIteration".to_string(),
            message: String::new(),
            stack: stack(4),
        }))
        .unwrap();
    events.wait_for("ignored exception", |event| {
        matches!(event, Event::ExceptionIgnored { count: 1, .. })
    });
    assert_eq!(
        debuggee.expect_request(TIMEOUT).unwrap(),
        Request::Continue { special: false }
    );
    assert_eq!(session.ignored_count("StopIteration"), 1);
    assert!(session.last_exception().is_none());

    debuggee
        .send(Response::Exception(ExceptionReport {
            type_name: "ValueError".to_string(),
            message: "bad value".to_string(),
            stack: stack(5),
        }))
        .unwrap();
    events.wait_for("exception", |event| matches!(event, Event::Exception(_)));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.last_exception().unwrap().type_name, "ValueError");
}

#[test]
fn unanswered_probe_disconnects() {
    let config = SessionConfig {
        ping_interval: Duration::from_millis(50),
        ping_timeout: Duration::from_millis(100),
        ..quiet_config()
    };
    let (session, debuggee, mut events) = running_session(config);
    debuggee.set_auto_pong(false);

    assert_eq!(debuggee.expect_request(TIMEOUT).unwrap(), Request::Ping);
    events.wait_for("disconnected", |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn answered_probes_keep_the_session_alive() {
    let config = SessionConfig {
        ping_interval: Duration::from_millis(30),
        ping_timeout: Duration::from_millis(100),
        ..quiet_config()
    };
    let (session, debuggee, _events) = running_session(config);

    assert_eq!(debuggee.expect_request(TIMEOUT).unwrap(), Request::Ping);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn shutdown_forces_close_after_timeout() {
    let (session, debuggee, _events) = running_session(quiet_config());

    let state = session.shutdown().unwrap();
    assert_eq!(state, SessionState::Disconnected);
    assert_eq!(debuggee.expect_request(TIMEOUT).unwrap(), Request::Shutdown);
}

#[test]
fn debuggee_hanging_up_disconnects() {
    let (session, debuggee, mut events) = running_session(quiet_config());
    debuggee.disconnect();

    let event = events.wait_for("disconnected", |event| {
        matches!(event, Event::Disconnected { .. })
    });
    tracing::debug!(?event, "session disconnected");
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.r#continue(),
        Err(SessionError::Terminated(SessionState::Disconnected))
    ));
}

#[test]
fn malformed_payload_disconnects() {
    let (session, debuggee, mut events) = running_session(quiet_config());
    debuggee.send_raw(b">Exit<4\0soon\n").unwrap();

    events.wait_for("disconnected", |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn program_output_is_forwarded() {
    let (_session, debuggee, mut events) = running_session(quiet_config());
    debuggee.send_raw(b"hello from the debuggee\n").unwrap();

    events.wait_for("output", |event| {
        matches!(event, Event::Output(text) if text.contains("hello from the debuggee"))
    });
}

#[test]
fn connect_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let debuggee = thread::spawn(move || {
        let transport = TcpTransport::accept(&listener).unwrap();
        let (_input, output) = transport.split().unwrap();
        let mut writer = Writer::new(output);
        writer
            .send(&startup().into_message().unwrap())
            .unwrap();
        // keep the socket open until the session has seen the startup
        thread::sleep(Duration::from_millis(500));
    });

    let session = Session::connect(addr, quiet_config()).unwrap();
    let mut events = Events::new(&session);
    events.wait_for("started", |event| matches!(event, Event::Started { .. }));
    assert_eq!(session.state(), SessionState::Running);

    debuggee.join().unwrap();
}
