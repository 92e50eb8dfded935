//! Breakpoint and watchpoint handling through the public API

use std::io::IsTerminal;
use std::path::Path;

use debugger::{
    Breakpoint, CodeObject, ConditionError, HitOutcome, Record, Registry, RegistryError, Session,
    SessionConfig, SessionError, SessionState, TraceEvent, Watchpoint,
};
use tracing_subscriber::EnvFilter;
use transport::InMemoryTransport;

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

/// Code on lines 1, 3, 4 and 7
fn line_table(_: &Path) -> eyre::Result<CodeObject> {
    Ok(CodeObject {
        first_line: 1,
        line_table: vec![(2, 2), (4, 1), (6, 3)],
        children: Vec::new(),
    })
}

#[test]
fn session_rejects_lines_without_code() -> eyre::Result<()> {
    let (ide, _debuggee) = InMemoryTransport::pair();
    let session = Session::with_transport(ide, SessionConfig::default())?;
    session.set_line_table_provider(line_table);

    let err = session
        .register_breakpoint(Breakpoint::new("/work/main.py", 2))
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Registry(RegistryError::InvalidLine { line: 2, .. })
    ));

    session.register_breakpoint(Breakpoint::new("/work/main.py", 3))?;
    assert_eq!(session.breakpoints(), vec![Breakpoint::new("/work/main.py", 3)]);
    assert_eq!(session.state(), SessionState::Idle);

    session.invalidate_breakable_lines(Path::new("/work/main.py"));
    session.register_breakpoint(Breakpoint::new("/work/main.py", 7))?;
    assert_eq!(session.breakpoints().len(), 2);
    Ok(())
}

#[test]
fn session_rejects_invalid_and_duplicate_watchpoints() -> eyre::Result<()> {
    let (ide, _debuggee) = InMemoryTransport::pair();
    let session = Session::with_transport(ide, SessionConfig::default())?;

    assert!(matches!(
        session.register_watchpoint(Watchpoint::new("")),
        Err(SessionError::Registry(RegistryError::InvalidWatchpoint))
    ));
    session.register_watchpoint(Watchpoint::new("x > 3"))?;
    assert!(matches!(
        session.register_watchpoint(Watchpoint::new("x > 3")),
        Err(SessionError::Registry(RegistryError::DuplicateWatchpoint(_)))
    ));
    assert!(session.remove_watchpoint("x > 3")?.is_some());
    assert!(session.watchpoints().is_empty());
    Ok(())
}

#[test]
fn temporary_breakpoint_with_ignore_count() {
    let mut registry = Registry::with_provider(line_table);
    registry
        .insert_breakpoint(
            Breakpoint::new("/work/main.py", 4)
                .temporary(true)
                .with_ignore_count(2),
        )
        .unwrap();

    let mut truthy = |_: &str| -> Result<bool, ConditionError> { Ok(true) };
    let file = Path::new("/work/main.py");
    assert_eq!(
        registry.hit(file, 4, &mut truthy),
        HitOutcome::Ignored { remaining: 1 }
    );
    assert_eq!(
        registry.hit(file, 4, &mut truthy),
        HitOutcome::Ignored { remaining: 0 }
    );
    assert_eq!(
        registry.hit(file, 4, &mut truthy),
        HitOutcome::Stop { temporary: true }
    );
    assert!(registry.breakpoint(file, 4).is_none());
    assert_eq!(registry.hit(file, 4, &mut truthy), HitOutcome::Pass);
}

#[test]
fn malformed_record_leaves_registry_unchanged() {
    let mut registry = Registry::new();
    registry
        .add_watchpoint_record("counter == 10:::False:::False:::True:::0")
        .unwrap();

    let err = registry
        .add_watchpoint_record("cond:::True:::False")
        .unwrap_err();
    assert!(matches!(err, RegistryError::MalformedRecord { .. }));
    let conditions: Vec<_> = registry
        .watchpoints()
        .map(|watchpoint| watchpoint.condition.as_str())
        .collect();
    assert_eq!(conditions, vec!["counter == 10"]);
}

#[test]
fn watchpoint_records_survive_a_round_trip() {
    let watchpoint = Watchpoint::new("total > 100").special(true).with_ignore_count(3);
    let parsed = Watchpoint::from_record(&watchpoint.to_record().unwrap()).unwrap();
    assert_eq!(parsed, watchpoint);

    let invalid = Watchpoint::new("");
    let parsed = Watchpoint::from_record(&invalid.to_record().unwrap()).unwrap();
    assert!(!parsed.is_valid());
}

#[test]
fn special_watchpoints_fire_on_line_events() {
    let mut registry = Registry::new();
    registry
        .add_watchpoint(Watchpoint::new("changed").special(true))
        .unwrap();
    registry.add_watchpoint(Watchpoint::new("plain")).unwrap();

    let mut truthy = |_: &str| -> Result<bool, ConditionError> { Ok(true) };
    let outcome = registry.check_watchpoints(TraceEvent::Line, &mut truthy);
    assert_eq!(
        outcome.stop.map(|watchpoint| watchpoint.condition),
        Some("changed".to_string())
    );
}
