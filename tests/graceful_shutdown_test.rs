//! Tests for graceful shutdown with timeout behavior.

mod common;

use camera_ctrl::adapters::mock::{DriverProbe, MockFifoDriver};
use camera_ctrl::channels::CallerEnds;
use camera_ctrl::messages::Command;
use camera_ctrl::{CameraError, CameraKind};
use common::{spawn_pco, spawn_ready, test_settings, wait_for_line, PROMPT};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_camera_shutdown_is_graceful() {
    let settings = test_settings(CameraKind::Simulated, 20.0, 64, 64);
    let (mut handle, _ends) = spawn_ready(&settings);

    // Brief pause to let the worker settle into its idle loop
    std::thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    handle.shutdown(settings.timing.shutdown_timeout()).unwrap();
    let elapsed = start.elapsed();

    // Should complete within a couple of ticks, far below the timeout
    assert!(
        elapsed < Duration::from_millis(500),
        "Graceful shutdown took too long: {:?}",
        elapsed
    );
    assert!(handle.is_finished());
}

#[test]
fn test_shutdown_while_streaming() {
    let settings = test_settings(CameraKind::Simulated, 5.0, 64, 64);
    let (mut handle, ends) = spawn_ready(&settings);

    handle.send(Command::StartLiveStream).unwrap();
    ends.images.recv_timeout(PROMPT).unwrap();

    let start = Instant::now();
    handle.shutdown(PROMPT).unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(500),
        "Shutdown during streaming took too long: {:?}",
        elapsed
    );
    let lines: Vec<String> = ends.diagnostics.drain().map(|d| d.text).collect();
    assert!(lines.iter().any(|l| l.starts_with("Live stream started")));
    assert_eq!(lines.last().map(String::as_str), Some("The Simulated camera is closed"));
}

#[test]
fn test_unresponsive_worker_is_detached() {
    let settings = test_settings(CameraKind::Pco, 5.0, 8, 8);
    let driver = MockFifoDriver::new(8, 8).with_close_delay(Duration::from_secs(2));
    let (mut handle, _ends) = spawn_pco(&settings, driver);

    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    let result = handle.shutdown(timeout);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(CameraError::Unresponsive(t)) if t == timeout));
    assert!(
        elapsed < Duration::from_millis(1000),
        "Shutdown did not honour its timeout: {:?}",
        elapsed
    );
    assert!(!handle.is_finished());
}

#[test]
fn test_shutdown_after_worker_already_exited() {
    let settings = test_settings(CameraKind::Simulated, 5.0, 8, 8);
    let (mut handle, ends) = spawn_ready(&settings);

    handle.send(Command::fault(anyhow::anyhow!("upstream failure"))).unwrap();
    wait_for_line(&ends.diagnostics, "camera is closed", PROMPT).expect("closed");

    handle.shutdown(PROMPT).unwrap();
    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_dropping_every_sender_closes_the_camera() {
    let settings = test_settings(CameraKind::Pco, 5.0, 8, 8);
    let probe = Arc::new(DriverProbe::default());
    let (handle, ends) = spawn_pco(&settings, MockFifoDriver::new(8, 8).with_probe(probe.clone()));

    let CallerEnds {
        commands, diagnostics, ..
    } = ends;
    drop(commands);
    drop(handle);

    wait_for_line(&diagnostics, "Command channel closed", PROMPT).expect("disconnect noticed");
    wait_for_line(&diagnostics, "camera is closed", PROMPT).expect("closed");
    // The worker drops its diagnostics sender on exit.
    let deadline = Instant::now() + PROMPT;
    while diagnostics.recv_deadline(deadline).is_ok() {}
    assert_eq!(probe.closes(), 1);
}
