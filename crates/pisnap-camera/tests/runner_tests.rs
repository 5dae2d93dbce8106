mod common;

use std::time::Duration;

use common::{Call, FakeBackend, Script};
use pisnap_camera::{CaptureError, CaptureRequest, CaptureRunner, RunnerSettings};
use pretty_assertions::assert_eq;

fn runner(script: Script) -> (CaptureRunner, common::Recorder) {
    let (backend, rec) = FakeBackend::new(script);
    (CaptureRunner::new(backend, RunnerSettings::default()), rec)
}

#[tokio::test(start_paused = true)]
async fn test_capture_writes_file_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("shot.jpg");
    let (runner, rec) = runner(Script::default());

    let outcome = runner.run(&CaptureRequest::new(&out, 640, 480).unwrap()).await.unwrap();

    assert_eq!(outcome.path, out);
    assert_eq!(std::fs::read(&out).unwrap(), b"fake-frame");
    assert_eq!(
        rec.calls(),
        vec![Call::Probe, Call::Open, Call::Configure(640, 480), Call::Start, Call::Capture, Call::Stop]
    );
    // no staging leftovers next to the target
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_request_is_full_hd() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, rec) = runner(Script::default());

    let req = CaptureRequest::with_defaults(dir.path().join("a.jpg")).unwrap();
    runner.run(&req).await.unwrap();

    assert!(rec.calls().contains(&Call::Configure(1920, 1080)));
}

#[tokio::test(start_paused = true)]
async fn test_warmup_elapses_before_capture() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, _rec) = runner(Script::default());
    let req = CaptureRequest::with_defaults(dir.path().join("a.jpg")).unwrap();

    let t0 = tokio::time::Instant::now();
    runner.run(&req).await.unwrap();
    assert!(t0.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never.jpg");
    let (runner, rec) = runner(Script { fail_open: true, ..Default::default() });

    let err = runner.run(&CaptureRequest::with_defaults(&out).unwrap()).await.unwrap_err();

    assert!(matches!(err, CaptureError::DeviceUnavailable(_)), "{err:?}");
    assert!(!out.exists());
    assert_eq!(rec.calls(), vec![Call::Probe, Call::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_tooling_never_opens() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, rec) = runner(Script { missing_tool: true, ..Default::default() });

    let err = runner
        .run(&CaptureRequest::with_defaults(dir.path().join("x.jpg")).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.install_hint(), Some("Install with: apt install fake-still"));
    assert_eq!(rec.calls(), vec![Call::Probe]);
}

#[tokio::test(start_paused = true)]
async fn test_parent_dir_created_before_open() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b/c");
    let (backend, rec) = FakeBackend::watching(Script::default(), Some(nested.clone()));
    let runner = CaptureRunner::new(backend, RunnerSettings::default());

    runner.run(&CaptureRequest::with_defaults(nested.join("x.jpg")).unwrap()).await.unwrap();

    assert_eq!(rec.dir_at_open(), Some(true));
    assert!(nested.join("x.jpg").is_file());
}

#[tokio::test(start_paused = true)]
async fn test_uncreatable_parent_skips_device() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a dir").unwrap();
    let (runner, rec) = runner(Script::default());

    let err = runner
        .run(&CaptureRequest::with_defaults(blocker.join("sub/x.jpg")).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::DirectoryCreation { .. }), "{err:?}");
    assert!(rec.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_capture_failure_still_stops() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("x.jpg");
    let (runner, rec) = runner(Script { fail_capture: true, ..Default::default() });

    let err = runner.run(&CaptureRequest::with_defaults(&out).unwrap()).await.unwrap_err();

    assert!(matches!(err, CaptureError::CaptureIo(_)), "{err:?}");
    assert_eq!(rec.calls().last(), Some(&Call::Stop));
    assert!(!out.exists());
    // the half-written partial is cleaned up too
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_release_failure_after_capture_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("x.jpg");
    let (runner, rec) = runner(Script { fail_stop: true, ..Default::default() });

    let outcome = runner.run(&CaptureRequest::with_defaults(&out).unwrap()).await.unwrap();

    assert_eq!(outcome.path, out);
    assert_eq!(std::fs::read(&out).unwrap(), b"fake-frame");
    assert_eq!(rec.calls().last(), Some(&Call::Stop));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("x.jpg");
    std::fs::write(&out, b"yesterday").unwrap();
    let (runner, _rec) = runner(Script { fail_capture: true, ..Default::default() });

    runner.run(&CaptureRequest::with_defaults(&out).unwrap()).await.unwrap_err();

    assert_eq!(std::fs::read(&out).unwrap(), b"yesterday");
}

#[tokio::test(start_paused = true)]
async fn test_configuration_failure_releases_without_start() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, rec) = runner(Script { fail_configure: true, ..Default::default() });

    let err = runner
        .run(&CaptureRequest::new(dir.path().join("x.jpg"), 9000, 9000).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::Configuration(_)), "{err:?}");
    assert_eq!(rec.calls(), vec![Call::Probe, Call::Open, Call::Configure(9000, 9000), Call::Stop]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_warmup_releases_device() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("x.jpg");
    let (runner, rec) = runner(Script::default());

    let err = runner
        .run_until(
            &CaptureRequest::with_defaults(&out).unwrap(),
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::Cancelled("warm-up")), "{err:?}");
    assert_eq!(
        rec.calls(),
        vec![Call::Probe, Call::Open, Call::Configure(1920, 1080), Call::Start, Call::Stop]
    );
    assert!(!out.exists());
}

#[tokio::test(start_paused = true)]
async fn test_hung_open_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, rec) = FakeBackend::new(Script { hang_open: true, ..Default::default() });
    let settings = RunnerSettings { warmup: Duration::from_secs(2), step_timeout: Some(Duration::from_secs(5)) };
    let runner = CaptureRunner::new(backend, settings);

    let err = runner
        .run(&CaptureRequest::with_defaults(dir.path().join("x.jpg")).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::Timeout { step: "open", .. }), "{err:?}");
    assert_eq!(rec.calls(), vec![Call::Probe, Call::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_warmup_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, _rec) = FakeBackend::new(Script::default());
    let settings = RunnerSettings { warmup: Duration::from_millis(250), step_timeout: None };
    let runner = CaptureRunner::new(backend, settings);
    let req = CaptureRequest::with_defaults(dir.path().join("x.jpg")).unwrap();

    let t0 = tokio::time::Instant::now();
    runner.run(&req).await.unwrap();
    let waited = t0.elapsed();
    assert!(waited >= Duration::from_millis(250) && waited < Duration::from_secs(2), "{waited:?}");
}
