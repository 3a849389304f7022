//! Session lifecycle tests against scripted session engines.

use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;

use super::*;
use crate::fake_engine::{FakeEngine, SessionBehaviour};

const CALL_BUDGET: Duration = Duration::from_secs(5);

fn settings(token: &str) -> SessionSettings {
    SessionSettings::new(Some(token.to_owned())).with_startup_timeout(Duration::from_secs(10))
}

fn started(behaviour: SessionBehaviour) -> (FakeEngine, EngineSession) {
    let engine = FakeEngine::session(behaviour).expect("fake engine");
    let session = EngineSession::new(engine.path(), settings("good-token"));
    session.start().expect("session starts");
    (engine, session)
}

fn app_file() -> Vec<SessionFile> {
    vec![SessionFile {
        path: PathBuf::from("/tmp/scanbox-test/app.py"),
        content: "import os\n".to_owned(),
    }]
}

#[rstest]
fn healthy_session_returns_decoded_report() {
    let (_engine, session) = started(SessionBehaviour::Healthy);
    assert_eq!(session.state(), SessionState::Ready);

    let result = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect("scan succeeds");

    let finding = result.findings.first().expect("one finding");
    assert_eq!(finding.rule_id, "fake.session-call");
    assert_eq!(finding.path, "/tmp/scanbox-test/app.py");
    assert_eq!(result.scanned_paths, ["/tmp/scanbox-test/app.py"]);
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn session_serves_consecutive_calls() {
    let (_engine, session) = started(SessionBehaviour::Healthy);

    for _ in 0..3 {
        session
            .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
            .expect("scan succeeds");
    }
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn session_start_sends_default_arguments() {
    let (engine, _session) = started(SessionBehaviour::Healthy);
    assert_eq!(
        engine.recorded_args().expect("args log"),
        ["mcp".to_owned(), "--pro".to_owned()]
    );
}

#[rstest]
#[case::wrong_token(Some("wrong-token"))]
#[case::blank_token(Some("  "))]
#[case::no_token(None)]
fn rejected_credentials_stop_the_session(#[case] token: Option<&str>) {
    let engine = FakeEngine::session(SessionBehaviour::Healthy).expect("fake engine");
    let session = EngineSession::new(
        engine.path(),
        SessionSettings::new(token.map(str::to_owned))
            .with_startup_timeout(Duration::from_secs(10)),
    );

    let error = session.start().expect_err("authentication fails");

    assert!(matches!(error, SessionError::Authentication { .. }));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[rstest]
fn engine_without_session_support_stops_the_session() {
    let engine = FakeEngine::session(SessionBehaviour::NoProSupport).expect("fake engine");
    let session = EngineSession::new(engine.path(), settings("good-token"));

    let error = session.start().expect_err("session support missing");

    assert!(matches!(error, SessionError::Authentication { .. }));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[rstest]
fn session_cannot_be_started_twice() {
    let (_engine, session) = started(SessionBehaviour::Healthy);

    let error = session.start().expect_err("second start");

    assert!(matches!(
        error,
        SessionError::NotReady {
            state: SessionState::Ready
        }
    ));
}

#[rstest]
fn call_timeout_degrades_the_session() {
    let (_engine, session) = started(SessionBehaviour::Silent);

    let error = session
        .scan_files(
            &app_file(),
            "auto",
            Duration::from_millis(300),
            &CancelToken::new(),
        )
        .expect_err("no reply");

    assert!(matches!(error, SessionError::Timeout { .. }));
    assert_eq!(session.state(), SessionState::Degraded);

    let refused = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect_err("degraded session refuses calls");
    assert!(matches!(
        refused,
        SessionError::NotReady {
            state: SessionState::Degraded
        }
    ));
}

#[rstest]
fn queued_call_gives_up_at_its_deadline_while_another_runs() {
    let (_engine, session) = started(SessionBehaviour::Slow);
    let queue_budget = Duration::from_millis(300);

    thread::scope(|scope| {
        let first = scope.spawn(|| {
            session.scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        });
        thread::sleep(Duration::from_millis(200));

        let queued_at = Instant::now();
        let error = session
            .scan_files(&app_file(), "auto", queue_budget, &CancelToken::new())
            .expect_err("channel is busy");
        let waited = queued_at.elapsed();

        assert!(matches!(error, SessionError::QueueTimeout { timeout } if timeout == queue_budget));
        assert!(waited >= queue_budget);
        assert!(waited < Duration::from_millis(1500), "waited {waited:?}");
        let report = first
            .join()
            .expect("first caller")
            .expect("first call completes");
        assert_eq!(report.scanned_paths, ["/tmp/scanbox-test/app.py"]);
    });

    assert_eq!(session.state(), SessionState::Ready);
    session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect("session still serves calls");
}

#[rstest]
fn malformed_reply_degrades_the_session() {
    let (_engine, session) = started(SessionBehaviour::Garbage);

    let error = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect_err("garbage reply");

    assert!(matches!(error, SessionError::Malformed { .. }));
    assert_eq!(session.state(), SessionState::Degraded);
}

#[rstest]
fn engine_error_reply_keeps_the_session_ready() {
    let (_engine, session) = started(SessionBehaviour::EngineError);

    let error = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect_err("engine error");

    match error {
        SessionError::Engine { code, message } => {
            assert_eq!(code, -32001);
            assert_eq!(message, "rule failed");
        }
        other => panic!("expected engine error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn cancellation_abandons_the_call_without_degrading() {
    let (_engine, session) = started(SessionBehaviour::Silent);
    let cancel = CancelToken::new();
    cancel.cancel();

    let error = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &cancel)
        .expect_err("cancelled");

    assert!(matches!(error, SessionError::Cancelled));
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn shutdown_is_terminal_and_idempotent() {
    let (_engine, session) = started(SessionBehaviour::Healthy);

    session.shutdown();
    session.shutdown();

    assert_eq!(session.state(), SessionState::Stopped);
    let error = session
        .scan_files(&app_file(), "auto", CALL_BUDGET, &CancelToken::new())
        .expect_err("stopped session refuses calls");
    assert!(matches!(
        error,
        SessionError::NotReady {
            state: SessionState::Stopped
        }
    ));
}

#[rstest]
fn launcher_returns_ready_session() {
    let engine = FakeEngine::session(SessionBehaviour::Healthy).expect("fake engine");
    let launcher = EngineSessionLauncher::new(settings("good-token"));

    let session = launcher.launch(engine.path()).expect("launch");

    assert_eq!(session.state(), SessionState::Ready);
    session.shutdown();
}

#[rstest]
fn settings_debug_redacts_token() {
    let rendered = format!("{:?}", settings("good-token"));
    assert!(!rendered.contains("good-token"));
    assert!(rendered.contains("<redacted>"));
}
