use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::TryRecvError;
use eyre::WrapErr;
use retry::{delay::Exponential, retry};
use transport::{
    DEFAULT_MAX_PAYLOAD_SIZE, PollResult, Reader, Request, TcpTransport, Transport, WireCodec,
    Writer,
    types::{ExceptionReport, Scope, Stack},
};

use crate::{
    Breakpoint, Event, SessionState, Watchpoint,
    breakable::LineTableProvider,
    commands::Command,
    error::SessionError,
    exceptions::ExceptionChannel,
    internals::SessionInternals,
};

/// Timeouts and limits of a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Send a liveness probe after this long without inbound traffic.
    pub ping_interval: Duration,
    /// Give up on the debuggee if a probe, or the load request, goes
    /// unanswered this long.
    pub ping_timeout: Duration,
    /// How long a shutdown waits for the debuggee to exit.
    pub shutdown_timeout: Duration,
    /// How long the worker waits for inbound data before looking at commands.
    pub poll_timeout: Duration,
    pub max_payload_size: usize,
    /// Connection attempts made by [`Session::connect`].
    pub connect_retries: usize,
    /// Exception types that are counted instead of reported.
    pub ignored_exceptions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(3),
            poll_timeout: Duration::from_millis(10),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            connect_retries: 5,
            ignored_exceptions: Vec::new(),
        }
    }
}

fn retry_scale(retries: usize) -> impl Iterator<Item = Duration> {
    Exponential::from_millis(200).take(retries)
}

fn reliable_tcp_stream<A>(addr: A, retries: usize) -> Result<TcpStream, retry::Error<io::Error>>
where
    A: ToSocketAddrs + Clone,
{
    retry(retry_scale(retries), || {
        tracing::debug!("trying to make connection");
        match TcpStream::connect(addr.clone()) {
            Ok(stream) => {
                tracing::debug!("connection made");
                Ok(stream)
            }
            Err(e) => {
                tracing::debug!(error = %e, "error making connection");
                Err(e)
            }
        }
    })
}

fn lock(internals: &Mutex<SessionInternals>) -> MutexGuard<'_, SessionInternals> {
    internals.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("session internals poisoned, recovering");
        poisoned.into_inner()
    })
}

/// A debugging session with one debuggee
///
/// A background worker owns the connection. It reads frames, writes the
/// requests submitted through [`Session::send_command`] and keeps the link
/// alive. Everything the debuggee reports is published as an [`Event`].
pub struct Session {
    internals: Arc<Mutex<SessionInternals>>,
    rx: crossbeam_channel::Receiver<Event>,
    command_tx: crossbeam_channel::Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Connect to a debuggee listening on `address`, retrying with
    /// exponential backoff.
    #[tracing::instrument(skip_all)]
    pub fn connect<A>(address: A, config: SessionConfig) -> eyre::Result<Self>
    where
        A: ToSocketAddrs + Clone,
    {
        let stream = reliable_tcp_stream(address, config.connect_retries)
            .wrap_err("failed to connect to debuggee")?;
        let transport = TcpTransport::new(stream)?;
        Self::with_transport(transport, config)
    }

    /// Wait for a debuggee to connect back to `listener`.
    #[tracing::instrument(skip_all)]
    pub fn accept(listener: &TcpListener, config: SessionConfig) -> eyre::Result<Self> {
        let transport = TcpTransport::accept(listener)?;
        Self::with_transport(transport, config)
    }

    /// Run a session over any transport, e.g. an in-memory pair in tests.
    pub fn with_transport<T: Transport>(transport: T, config: SessionConfig) -> eyre::Result<Self> {
        tracing::debug!("creating new session");
        let (input, output) = transport.split().wrap_err("splitting transport")?;
        let codec = WireCodec::with_max_size(config.max_payload_size);
        let reader = Reader::with_codec(input, codec.clone());
        let writer = Writer::with_codec(output, codec);

        let (tx, rx) = crossbeam_channel::unbounded();
        let exceptions = ExceptionChannel::with_ignored(config.ignored_exceptions.iter().cloned());
        let internals = Arc::new(Mutex::new(SessionInternals::new(tx, exceptions)));

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let worker = Worker {
            reader,
            writer,
            internals: Arc::clone(&internals),
            command_rx,
            follow_ups: VecDeque::new(),
            last_inbound: Instant::now(),
            probe_sent: None,
            load_sent: None,
            deadline: None,
            config,
        };
        let worker = thread::Builder::new()
            .name("session-worker".to_string())
            .spawn(move || worker.run())
            .wrap_err("spawning session worker")?;

        Ok(Self {
            internals,
            rx,
            command_tx,
            worker: Some(worker),
        })
    }

    /// Write a request to the debuggee.
    ///
    /// Requests that the current state does not allow are rejected with
    /// [`SessionError::InvalidState`] and never written. Replies arrive as
    /// events.
    #[tracing::instrument(skip(self), fields(word = %request.word()))]
    pub fn send_command(&self, request: Request) -> Result<(), SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Send {
                request,
                response_tx,
            })
            .is_err()
        {
            return Err(self.gone());
        }
        response_rx.recv().unwrap_or_else(|_| Err(self.gone()))
    }

    fn send_all(&self, requests: Vec<Request>) -> Result<(), SessionError> {
        for request in requests {
            self.send_command(request)?;
        }
        Ok(())
    }

    fn gone(&self) -> SessionError {
        match self.state() {
            state if state.is_terminal() => SessionError::Terminated(state),
            _ => SessionError::NotConnected,
        }
    }

    /// Start a program in a debuggee that connected without one.
    pub fn load(
        &self,
        working_directory: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Result<(), SessionError> {
        self.send_command(Request::Load {
            working_directory: working_directory.into(),
            program: program.into(),
            args,
            trace_stdlib: false,
        })
    }

    /// Resume execution of the debuggee
    pub fn r#continue(&self) -> Result<(), SessionError> {
        self.send_command(Request::Continue { special: false })
    }

    pub fn step(&self) -> Result<(), SessionError> {
        self.send_command(Request::Step)
    }

    pub fn step_over(&self) -> Result<(), SessionError> {
        self.send_command(Request::StepOver)
    }

    pub fn step_out(&self) -> Result<(), SessionError> {
        self.send_command(Request::StepOut)
    }

    /// Evaluate an expression in a frame of the stopped debuggee. The result
    /// arrives as [`Event::EvalResult`].
    pub fn evaluate(&self, frame: u32, expression: impl Into<String>) -> Result<(), SessionError> {
        self.send_command(Request::Eval {
            frame,
            expression: expression.into(),
        })
    }

    pub fn execute(&self, frame: u32, statement: impl Into<String>) -> Result<(), SessionError> {
        self.send_command(Request::Exec {
            frame,
            statement: statement.into(),
        })
    }

    pub fn variables(&self, frame: u32, scope: Scope) -> Result<(), SessionError> {
        self.send_command(Request::Variables { frame, scope })
    }

    /// Events received since the last call, without blocking.
    pub fn poll_events(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Return a [`crossbeam_channel::Receiver<Event>`] to subscribe to session events
    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.rx.clone()
    }

    /// Add a breakpoint. A live debuggee is told straight away, otherwise it
    /// learns about the breakpoint when it starts.
    #[tracing::instrument(skip(self))]
    pub fn register_breakpoint(&self, breakpoint: Breakpoint) -> Result<(), SessionError> {
        let requests = self.with_lock(|internals| {
            let requests = internals
                .registry
                .insert_breakpoint(breakpoint)?
                .sync_requests();
            Ok::<_, SessionError>(internals.state().is_live().then_some(requests))
        })?;
        self.send_all(requests.unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_breakpoint(
        &self,
        file: &Path,
        line: u32,
    ) -> Result<Option<Breakpoint>, SessionError> {
        let (removed, live) = self.with_lock(|internals| {
            (
                internals.registry.remove_breakpoint(file, line),
                internals.state().is_live(),
            )
        });
        if let (Some(breakpoint), true) = (&removed, live) {
            self.send_command(breakpoint.set_request(false))?;
        }
        Ok(removed)
    }

    pub fn enable_breakpoint(
        &self,
        file: &Path,
        line: u32,
        enabled: bool,
    ) -> Result<(), SessionError> {
        let request = self.with_lock(|internals| {
            let request = internals
                .registry
                .enable_breakpoint(file, line, enabled)?
                .enable_request();
            Ok::<_, SessionError>(internals.state().is_live().then_some(request))
        })?;
        self.send_all(request.into_iter().collect())
    }

    pub fn set_breakpoint_ignore_count(
        &self,
        file: &Path,
        line: u32,
        count: u32,
    ) -> Result<(), SessionError> {
        let request = self.with_lock(|internals| {
            let request = internals
                .registry
                .set_breakpoint_ignore_count(file, line, count)?
                .ignore_request();
            Ok::<_, SessionError>(internals.state().is_live().then_some(request))
        })?;
        self.send_all(request.into_iter().collect())
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.with_lock(|internals| internals.registry.breakpoints().cloned().collect())
    }

    #[tracing::instrument(skip(self))]
    pub fn register_watchpoint(&self, watchpoint: Watchpoint) -> Result<(), SessionError> {
        let requests = self.with_lock(|internals| {
            let requests = internals
                .registry
                .add_watchpoint(watchpoint)?
                .sync_requests();
            Ok::<_, SessionError>(internals.state().is_live().then_some(requests))
        })?;
        self.send_all(requests.unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_watchpoint(&self, condition: &str) -> Result<Option<Watchpoint>, SessionError> {
        let (removed, live) = self.with_lock(|internals| {
            (
                internals.registry.remove_watchpoint(condition),
                internals.state().is_live(),
            )
        });
        if let (Some(watchpoint), true) = (&removed, live) {
            self.send_command(watchpoint.set_request(false))?;
        }
        Ok(removed)
    }

    pub fn enable_watchpoint(&self, condition: &str, enabled: bool) -> Result<(), SessionError> {
        let request = self.with_lock(|internals| {
            let request = internals
                .registry
                .enable_watchpoint(condition, enabled)?
                .enable_request();
            Ok::<_, SessionError>(internals.state().is_live().then_some(request))
        })?;
        self.send_all(request.into_iter().collect())
    }

    pub fn set_watchpoint_ignore_count(
        &self,
        condition: &str,
        count: u32,
    ) -> Result<(), SessionError> {
        let request = self.with_lock(|internals| {
            let request = internals
                .registry
                .set_watchpoint_ignore_count(condition, count)?
                .ignore_request();
            Ok::<_, SessionError>(internals.state().is_live().then_some(request))
        })?;
        self.send_all(request.into_iter().collect())
    }

    pub fn watchpoints(&self) -> Vec<Watchpoint> {
        self.with_lock(|internals| internals.registry.watchpoints().cloned().collect())
    }

    /// Count exceptions of this type instead of reporting them.
    pub fn set_ignored(&self, type_name: impl Into<String>) -> bool {
        self.with_lock(|internals| internals.exceptions.set_ignored(type_name))
    }

    pub fn unset_ignored(&self, type_name: &str) -> bool {
        self.with_lock(|internals| internals.exceptions.unset_ignored(type_name))
    }

    pub fn ignored_exceptions(&self) -> Vec<String> {
        self.with_lock(|internals| internals.exceptions.ignored().map(String::from).collect())
    }

    pub fn ignored_count(&self, type_name: &str) -> u64 {
        self.with_lock(|internals| internals.exceptions.ignored_count(type_name))
    }

    /// Supply line tables so breakpoints on lines without code are rejected.
    pub fn set_line_table_provider(&self, provider: impl LineTableProvider + Send + 'static) {
        self.with_lock(|internals| internals.registry.set_provider(provider));
    }

    /// Forget the breakable lines of a file, e.g. after it was edited.
    pub fn invalidate_breakable_lines(&self, path: &Path) {
        self.with_lock(|internals| internals.registry.invalidate(path));
    }

    pub fn state(&self) -> SessionState {
        self.with_lock(|internals| internals.state())
    }

    /// Stack of the most recent stop, cleared when the debuggee resumes.
    pub fn last_stack(&self) -> Option<Stack> {
        self.with_lock(|internals| internals.last_stack.clone())
    }

    pub fn last_exception(&self) -> Option<ExceptionReport> {
        self.with_lock(|internals| internals.last_exception().cloned())
    }

    pub fn current_thread(&self) -> Option<i64> {
        self.with_lock(|internals| internals.current_thread)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.with_lock(|internals| internals.exit_code)
    }

    /// Ask the debuggee to exit and wait for the worker to close the
    /// connection, forcibly once the shutdown timeout has passed.
    #[tracing::instrument(skip(self))]
    pub fn shutdown(mut self) -> eyre::Result<SessionState> {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| eyre::eyre!("session worker panicked"))?;
        }
        Ok(self.state())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn with_lock<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut SessionInternals) -> T,
    {
        tracing::trace!(poisoned = %self.internals.is_poisoned(), "trying to lock internals");
        let mut internals = lock(&self.internals);
        tracing::trace!("executing operation");
        let res = f(&mut internals);
        drop(internals);
        tracing::trace!("unlocked internals");
        res
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            tracing::debug!("dropping session");
            if self.command_tx.send(Command::Shutdown).is_err() {
                tracing::debug!("session worker already finished");
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// The background half of a session
struct Worker<R, W> {
    reader: Reader<R>,
    writer: Writer<W>,
    internals: Arc<Mutex<SessionInternals>>,
    command_rx: crossbeam_channel::Receiver<Command>,
    config: SessionConfig,
    /// Requests raised by inbound traffic, e.g. the breakpoint resync.
    follow_ups: VecDeque<Request>,
    last_inbound: Instant,
    probe_sent: Option<Instant>,
    /// When `Load` went out; the debuggee must answer within `ping_timeout`.
    load_sent: Option<Instant>,
    /// Once set, the connection is closed at this instant at the latest.
    deadline: Option<Instant>,
}

impl<R, W> Worker<R, W>
where
    R: Read,
    W: Write,
{
    fn run(mut self) {
        while let Flow::Continue = self.step() {}
        tracing::debug!("session worker finished");
    }

    fn step(&mut self) -> Flow {
        // 1. inbound traffic
        match self.reader.try_poll_frame(self.config.poll_timeout) {
            Ok(PollResult::Frame(frame)) => {
                tracing::debug!(?frame, "received frame");
                self.last_inbound = Instant::now();
                self.probe_sent = None;
                let result = lock(&self.internals).on_frame(frame);
                match result {
                    Ok(follow_ups) => self.follow_ups.extend(follow_ups),
                    Err(e) => {
                        tracing::error!(error = %e, "undecodable message from debuggee");
                        return self.disconnect(format!("protocol error: {e}"));
                    }
                }
            }
            Ok(PollResult::Closed) => return self.disconnect("connection closed by debuggee"),
            Ok(PollResult::Timeout) => {}
            Err(e) if e.is_connection_closed() => {
                return self.disconnect(format!("connection lost: {e}"));
            }
            Err(e) => {
                tracing::error!(error = %e, "error receiving frame, terminating");
                return self.disconnect(format!("protocol error: {e}"));
            }
        }

        // 2. commands from the session handle
        loop {
            match self.command_rx.try_recv() {
                Ok(Command::Send {
                    request,
                    response_tx,
                }) => {
                    let result = self.send(request);
                    let write_failed = matches!(result, Err(SessionError::Protocol(_)));
                    let _ = response_tx.send(result);
                    if write_failed {
                        return self.disconnect("failed to write to debuggee");
                    }
                }
                Ok(Command::Shutdown) => self.begin_shutdown(),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.begin_shutdown();
                    break;
                }
            }
        }

        // 3. follow-up requests
        while let Some(request) = self.follow_ups.pop_front() {
            match self.send(request) {
                Ok(()) => {}
                Err(SessionError::Protocol(e)) => {
                    return self.disconnect(format!("failed to write to debuggee: {e}"));
                }
                Err(e) => tracing::warn!(error = %e, "dropping follow-up request"),
            }
        }

        // 4. timers
        let state = lock(&self.internals).state();
        let now = Instant::now();
        if state.is_terminal() && self.deadline.is_none() {
            // let the debuggee finish writing before closing
            self.deadline = Some(now + self.config.shutdown_timeout);
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            tracing::debug!("closing connection");
            return self.disconnect("debuggee did not exit before the shutdown timeout");
        }

        if state == SessionState::Connecting && self.deadline.is_none() {
            let waiting_since = self
                .load_sent
                .map_or(self.last_inbound, |sent| sent.max(self.last_inbound));
            if now.duration_since(waiting_since) >= self.config.ping_timeout {
                tracing::error!("debuggee did not answer the load request");
                return self.disconnect("no reply to load request");
            }
        }

        if state.is_live() && self.deadline.is_none() {
            match self.probe_sent {
                Some(sent) if now.duration_since(sent) >= self.config.ping_timeout => {
                    tracing::error!("liveness probe unanswered");
                    return self.disconnect("liveness probe timed out");
                }
                None if now.duration_since(self.last_inbound) >= self.config.ping_interval => {
                    match self.send(Request::Ping) {
                        Ok(()) => self.probe_sent = Some(now),
                        Err(SessionError::Protocol(e)) => {
                            return self.disconnect(format!("failed to write to debuggee: {e}"));
                        }
                        Err(e) => tracing::warn!(error = %e, "could not send liveness probe"),
                    }
                }
                _ => {}
            }
        }

        Flow::Continue
    }

    fn send(&mut self, request: Request) -> Result<(), SessionError> {
        let mut internals = lock(&self.internals);
        internals.check_send(&request)?;
        self.writer.send(&request.clone().into_message())?;
        if matches!(request, Request::Load { .. }) {
            self.load_sent = Some(Instant::now());
        }
        internals.on_sent(request);
        Ok(())
    }

    fn begin_shutdown(&mut self) {
        if self.deadline.is_some() {
            return;
        }
        let now = Instant::now();
        if lock(&self.internals).state().is_terminal() {
            self.deadline = Some(now);
            return;
        }
        tracing::debug!("requesting debuggee shutdown");
        match self.send(Request::Shutdown) {
            Ok(()) => self.deadline = Some(now + self.config.shutdown_timeout),
            Err(e) => {
                tracing::warn!(error = %e, "failed to request shutdown");
                self.deadline = Some(now);
            }
        }
    }

    /// Terminal: the worker stops and the connection is dropped.
    fn disconnect(&mut self, reason: impl Into<String>) -> Flow {
        lock(&self.internals).on_disconnect(reason);
        Flow::Stop
    }
}
