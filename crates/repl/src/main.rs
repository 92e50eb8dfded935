use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::JoinHandle;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use crossbeam_channel::Receiver;
use debugger::{Event, Session, SessionState};
use tracing_subscriber::filter::EnvFilter;
use transport::Request;
use transport::requests::ForkTarget;

mod command;

use command::{BreakpointSpec, Command};

struct App {
    session: Session,
    session_events: Receiver<Event>,
    input_rx: Receiver<String>,

    #[allow(dead_code)]
    input_thread: JoinHandle<()>,
}

impl App {
    fn new(session: Session) -> Self {
        let session_events = session.events();

        // handle input
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let input_thread = std::thread::spawn(move || {
            let mut buffer = String::new();
            loop {
                match std::io::stdin().read_line(&mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        let input = buffer.trim().to_owned();
                        if input_tx.send(input).is_err() {
                            break;
                        }
                        buffer.clear();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reading from stdin");
                        break;
                    }
                }
            }
        });

        Self {
            session,
            session_events,
            input_thread,
            input_rx,
        }
    }

    fn loop_step(&mut self) -> eyre::Result<ShouldQuit> {
        tracing::trace!("locking stdout");
        print!("({}) > ", self.session.state());
        tracing::trace!("prompt written, flushing stdout");
        std::io::stdout().flush()?;
        tracing::trace!("stdout flushed");

        crossbeam_channel::select! {
            recv(self.input_rx) -> input => match input {
                Ok(input) => self.handle_input(&input).context("handling command"),
                // stdin closed
                Err(_) => Ok(ShouldQuit::True),
            },
            recv(self.session_events) -> event => if let Ok(event) = event {
                self.handle_session_event(event).context("handling session event")
            } else {
                Ok(ShouldQuit::True)
            },
        }
    }

    #[tracing::instrument(skip(self))]
    fn handle_session_event(&mut self, event: Event) -> eyre::Result<ShouldQuit> {
        match event {
            Event::StateChanged { .. } => {}
            Event::Started { file, pid } => match pid {
                Some(pid) => println!("debuggee {file} started (pid {pid})"),
                None => println!("debuggee {file} started"),
            },
            Event::Stopped { stack } => match stack.first() {
                Some(frame) => println!("program paused at {}:{}", frame.file, frame.line),
                None => println!("program paused"),
            },
            Event::Stack(stack) => {
                for (i, frame) in stack.iter().enumerate() {
                    println!(
                        "#{i} {}({}) at {}:{}",
                        frame.function, frame.arguments, frame.file, frame.line
                    );
                }
            }
            Event::Output(text) => println!("{text}"),
            Event::Exception(report) => {
                println!("exception {}: {}", report.type_name, report.message);
                if let Some(frame) = report.stack.first() {
                    println!("  raised at {}:{}", frame.file, frame.line);
                }
            }
            Event::ExceptionIgnored { type_name, count } => {
                tracing::debug!(%type_name, count, "exception ignored");
            }
            Event::SyntaxError(info) => {
                println!(
                    "syntax error in {}:{}:{}: {}",
                    info.file, info.line, info.column, info.message
                );
            }
            Event::EvalResult { result, error, .. } => {
                if error {
                    println!("error: {result}");
                } else {
                    println!("{result}");
                }
            }
            Event::ExecResult { error, .. } => {
                if let Some(error) = error {
                    println!("error: {error}");
                }
            }
            Event::ThreadList(list) => {
                for thread in list.threads {
                    let marker = if thread.id == list.current { "*" } else { " " };
                    println!("{marker} {} {} ({:?})", thread.id, thread.name, thread.state);
                }
            }
            Event::ThreadSet { thread } => {
                if let Some(thread) = thread {
                    println!("switched to thread {thread}");
                }
            }
            Event::Variables(list) => {
                for variable in list.variables {
                    println!("{}: {} = {}", variable.name, variable.type_name, variable.value);
                }
            }
            Event::BreakpointCleared { file, line } => {
                println!("breakpoint {file}:{line} removed");
            }
            Event::BreakpointConditionError { file, line } => {
                println!("condition of breakpoint {file}:{line} could not be evaluated");
            }
            Event::WatchpointCleared { condition } => {
                println!("watchpoint {condition} removed");
            }
            Event::WatchpointConditionError { condition } => {
                println!("watch expression {condition} could not be evaluated");
            }
            Event::ForkRequested => {
                println!("debuggee is forking, following the parent");
                self.session
                    .send_command(Request::ForkTo(ForkTarget::Parent))
                    .context("answering fork")?;
            }
            Event::RawInput(input) => {
                println!("debuggee is waiting for input: {}", input.prompt);
            }
            Event::Exited { code } => {
                println!("program completed with exit code {code}");
                return Ok(ShouldQuit::True);
            }
            Event::Disconnected { reason } => {
                println!("connection lost: {reason}");
                return Ok(ShouldQuit::True);
            }
        }
        Ok(ShouldQuit::False)
    }

    fn handle_input(&mut self, input: &str) -> eyre::Result<ShouldQuit> {
        let command = match input.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                return Ok(ShouldQuit::False);
            }
        };
        tracing::debug!(?command, "executing command");

        let result = match command {
            Command::Empty => Ok(()),
            Command::Quit => return Ok(ShouldQuit::True),
            Command::Continue => self.session.r#continue(),
            Command::Step => self.session.step(),
            Command::StepOver => self.session.step_over(),
            Command::StepOut => self.session.step_out(),
            Command::Stack => self.session.send_command(Request::CurrentStack),
            Command::Threads => self.session.send_command(Request::ThreadList),
            Command::Variables(scope) => self.session.variables(0, scope),
            Command::Eval(expression) => self.session.evaluate(0, expression),
            Command::Exec(statement) => self.session.execute(0, statement),
            Command::Break(spec) => self.session.register_breakpoint(spec.into()),
            Command::Clear { file, line } => {
                self.session.remove_breakpoint(&file, line).map(|removed| {
                    if removed.is_none() {
                        println!("no breakpoint at {}:{line}", file.display());
                    }
                })
            }
            Command::Ignore(type_name) => {
                self.session.set_ignored(type_name);
                Ok(())
            }
            Command::Exit => self.session.send_command(Request::Shutdown),
        };

        // rejected commands are the user's mistake, not a reason to quit
        if let Err(e) = result {
            println!("{e}");
        }
        Ok(ShouldQuit::False)
    }
}

#[derive(Debug, Parser)]
#[command(about = "Interactive debugger front-end")]
struct Args {
    /// Address of the debuggee, or the address to listen on with --listen
    #[clap(default_value = "127.0.0.1:42424")]
    address: String,

    /// Wait for the debuggee to connect instead of connecting to it
    #[clap(short, long)]
    listen: bool,

    /// Breakpoints as file:line[:condition]
    #[clap(short, long)]
    breakpoint: Vec<BreakpointSpec>,

    /// Exception types to count instead of stopping on
    #[clap(short, long)]
    ignore_exception: Vec<String>,

    /// Configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// File that keeps breakpoints between runs
    #[clap(short, long)]
    state: Option<PathBuf>,

    /// Where to write logs
    #[clap(long, default_value = "cdm-debug.log")]
    log_file: PathBuf,
}

fn main() -> eyre::Result<()> {
    color_eyre::install().context("installing color_eyre")?;
    let args = Args::parse();

    let log_file = std::fs::File::create(&args.log_file).context("creating log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Mutex::new(log_file))
        .init();

    let config = config::Config::load(args.config.as_deref()).context("loading configuration")?;
    let mut session_config = config.session_config();
    session_config
        .ignored_exceptions
        .extend(args.ignore_exception.iter().cloned());

    let state_manager = match args.state.clone().or_else(state::StateManager::default_path) {
        Some(path) => Some(state::StateManager::new(path).context("opening state file")?),
        None => None,
    };
    if let Some(state) = &state_manager {
        session_config
            .ignored_exceptions
            .extend(state.current().ignored_exceptions.iter().cloned());
    }

    let session = if args.listen {
        let listener = TcpListener::bind(&args.address)
            .with_context(|| format!("listening on {}", args.address))?;
        println!("waiting for debuggee on {}", args.address);
        Session::accept(&listener, session_config).context("accepting debuggee")?
    } else {
        Session::connect(args.address.as_str(), session_config)
            .context("connecting to debuggee")?
    };

    if let Some(state) = &state_manager {
        for breakpoint in state.current().breakpoints() {
            tracing::debug!(?breakpoint, "restoring breakpoint");
            if let Err(e) = session.register_breakpoint(breakpoint.clone()) {
                println!("skipping stored breakpoint: {e}");
            }
        }
        for watchpoint in &state.current().watchpoints {
            if let Err(e) = session.register_watchpoint(watchpoint.clone()) {
                println!("skipping stored watchpoint: {e}");
            }
        }
    }
    for breakpoint in args.breakpoint {
        tracing::debug!(?breakpoint, "adding breakpoint");
        session
            .register_breakpoint(breakpoint.into())
            .context("adding breakpoint")?;
    }
    tracing::debug!("breakpoints added");

    let mut app = App::new(session);
    tracing::debug!("session set up");
    loop {
        match app.loop_step() {
            Ok(ShouldQuit::True) => break,
            Ok(ShouldQuit::False) => {}
            Err(e) => eyre::bail!("Error running command: {e}"),
        }
    }

    if let Some(mut manager) = state_manager {
        manager.current_mut().record(
            &app.session.breakpoints(),
            &app.session.watchpoints(),
            app.session.ignored_exceptions(),
        );
        manager.save().context("saving state")?;
    }

    let final_state = app.session.shutdown().context("shutting down session")?;
    tracing::debug!(%final_state, "session finished");
    if final_state == SessionState::Disconnected {
        tracing::warn!("debuggee did not exit cleanly");
    }
    Ok(())
}

enum ShouldQuit {
    True,
    False,
}
