//! Physical camera variants: degraded mode without a device, and error
//! severities during acquisition with mock drivers.

mod common;

use camera_ctrl::adapters::ids::{LIVE_PLACEHOLDER, SNAP_PLACEHOLDER};
use camera_ctrl::adapters::mock::{DriverProbe, MockBufferDriver, MockFifoDriver};
use camera_ctrl::adapters::pco::{FifoConnector, FifoDriver};
use camera_ctrl::adapters::{AdapterSettings, DeviceAdapter, PcoCamera};
use camera_ctrl::camera_actor::CameraActor;
use camera_ctrl::error::{DeviceError, DeviceResult};
use camera_ctrl::messages::Command;
use camera_ctrl::{CameraError, CameraKind, ImageItem, Pixels};
use common::{spawn_ids, spawn_pco, spawn_ready, test_settings, wait_for_line, PROMPT};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_pco_without_device_serves_placeholder_frames() {
    let settings = test_settings(CameraKind::Pco, 10.0, 64, 48);
    let (mut handle, ends) = CameraActor::spawn(&settings).unwrap();

    let line = wait_for_line(&ends.diagnostics, "not available", PROMPT).expect("degraded notice");
    assert!(line.starts_with("PCO camera not available"));
    wait_for_line(&ends.diagnostics, "worker has been launched", PROMPT).unwrap();

    handle.send(Command::SnapSingleImage).unwrap();
    handle.send(Command::SnapSingleImage).unwrap();
    let first = ends.images.recv_timeout(PROMPT).unwrap().into_frame().unwrap();
    let second = ends.images.recv_timeout(PROMPT).unwrap().into_frame().unwrap();
    assert_eq!(first.shape(), (48, 64));
    assert!(matches!(first.pixels, Pixels::Mono16(_)));
    assert_eq!(first.pixels, second.pixels);

    handle.send(Command::StartLiveStream).unwrap();
    assert!(ends.images.recv_timeout(PROMPT).unwrap().as_frame().is_some());

    handle.shutdown(PROMPT).unwrap();
    assert!(ends.faults.is_empty());
}

#[test]
fn test_ids_without_device_serves_placeholder_text() {
    let settings = test_settings(CameraKind::Ids, 5.0, 64, 48);
    let (mut handle, ends) = spawn_ready(&settings);

    handle.send(Command::SnapSingleImage).unwrap();
    assert_eq!(
        ends.images.recv_timeout(PROMPT).unwrap(),
        ImageItem::Placeholder(SNAP_PLACEHOLDER.to_string())
    );

    handle.send(Command::SetExposure(0.5)).unwrap();
    let line = wait_for_line(&ends.diagnostics, "exposure time", PROMPT).unwrap();
    assert_eq!(line, "The set exposure time ms: 0.500");

    handle.send(Command::StartLiveStream).unwrap();
    assert_eq!(
        ends.images.recv_timeout(PROMPT).unwrap(),
        ImageItem::Placeholder(LIVE_PLACEHOLDER.to_string())
    );
    handle.send(Command::StopLiveStream).unwrap();
    wait_for_line(&ends.diagnostics, "Live stream stopped", PROMPT).unwrap();

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_failing_connector_degrades() {
    let settings = test_settings(CameraKind::Pco, 5.0, 16, 16);
    let adapter_settings = AdapterSettings::from_config(&settings.camera, &settings.timing);
    let (mut handle, ends) = CameraActor::spawn_with(
        &settings,
        Box::new(move || {
            let connector: FifoConnector = Box::new(|| -> DeviceResult<Box<dyn FifoDriver>> {
                Err(DeviceError::Driver("camera link busy".to_string()))
            });
            Box::new(PcoCamera::new(&adapter_settings, connector)) as Box<dyn DeviceAdapter>
        }),
    )
    .unwrap();

    let line = wait_for_line(&ends.diagnostics, "not available", PROMPT).unwrap();
    assert!(line.contains("camera link busy"));
    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_pco_reports_status_after_opening() {
    let settings = test_settings(CameraKind::Pco, 5.0, 16, 16);
    let adapter_settings = AdapterSettings::from_config(&settings.camera, &settings.timing);
    let connector = MockFifoDriver::new(32, 24).connector();
    let (mut handle, ends) = CameraActor::spawn_with(
        &settings,
        Box::new(move || Box::new(PcoCamera::new(&adapter_settings, connector)) as Box<dyn DeviceAdapter>),
    )
    .unwrap();

    let line = wait_for_line(&ends.diagnostics, "initialized", PROMPT).unwrap();
    assert_eq!(line, "The PCO camera initialized, sensor bounds 32x24");
    let status = wait_for_line(&ends.diagnostics, "camera status", PROMPT).unwrap();
    assert!(status.contains("health: no warnings, no errors"));
    assert!(status.contains("trigger mode: auto sequence"));

    handle.send("Get the PCO camera status".parse().unwrap()).unwrap();
    wait_for_line(&ends.diagnostics, "camera status", PROMPT).expect("status on demand");

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_pco_crop_uses_one_based_region() {
    let settings = test_settings(CameraKind::Pco, 5.0, 16, 16);
    let probe = Arc::new(DriverProbe::default());
    let (mut handle, ends) = spawn_pco(&settings, MockFifoDriver::new(40, 30).with_probe(probe.clone()));

    handle
        .send(Command::parameterized("Crop Image", &[5.0, 10.0, 8.0, 12.0]).unwrap())
        .unwrap();
    handle.send(Command::SnapSingleImage).unwrap();
    let frame = ends.images.recv_timeout(PROMPT).unwrap().into_frame().unwrap();
    assert_eq!(frame.shape(), (8, 12));
    assert_eq!(probe.roi(), Some((11, 6, 22, 13)));

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_resize_is_unsupported_on_physical_cameras() {
    let settings = test_settings(CameraKind::Ids, 5.0, 16, 16);
    let (mut handle, ends) = spawn_ready(&settings);

    handle
        .send(Command::ResizeSimulated {
            width: 32,
            height: 32,
        })
        .unwrap();
    let line = wait_for_line(&ends.diagnostics, "not supported", PROMPT).unwrap();
    assert!(line.contains("IDS"));

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_transient_frame_loss_keeps_streaming() {
    let settings = test_settings(CameraKind::Ids, 2.0, 8, 8);
    let (mut handle, ends) = spawn_ids(&settings, MockBufferDriver::new(8, 8).losing_every(3));

    handle.send(Command::StartLiveStream).unwrap();
    for _ in 0..6 {
        ends.images.recv_timeout(PROMPT).unwrap();
    }
    wait_for_line(&ends.diagnostics, "Frame lost", PROMPT).expect("loss reported");
    assert!(ends.faults.is_empty());
    assert!(!handle.is_finished());

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_recoverable_error_stops_stream_and_keeps_device() {
    let settings = test_settings(CameraKind::Pco, 2.0, 8, 8);
    let driver = MockFifoDriver::new(8, 8).failing_after(3, DeviceError::Timeout(Duration::from_millis(5)));
    let (mut handle, ends) = spawn_pco(&settings, driver);

    handle.send(Command::StartLiveStream).unwrap();
    let fault = ends.faults.recv_timeout(PROMPT).unwrap();
    assert!(matches!(fault, CameraError::Device(DeviceError::Timeout(_))));
    wait_for_line(&ends.diagnostics, "Live stream stopped", PROMPT).expect("back to ready");

    handle.send(Command::GetStatus).unwrap();
    wait_for_line(&ends.diagnostics, "PCO camera status", PROMPT).expect("device still open");
    assert!(!handle.is_finished());
    assert_eq!(ends.images.drain().count(), 3);

    handle.shutdown(PROMPT).unwrap();
    assert!(ends.faults.is_empty());
}

#[test]
fn test_fatal_error_closes_device() {
    let settings = test_settings(CameraKind::Ids, 2.0, 8, 8);
    let probe = Arc::new(DriverProbe::default());
    let driver = MockBufferDriver::new(8, 8)
        .with_probe(probe.clone())
        .failing_after(2, DeviceError::Disconnected("cable pulled".into()));
    let (mut handle, ends) = spawn_ids(&settings, driver);

    handle.send(Command::StartLiveStream).unwrap();
    let fault = ends.faults.recv_timeout(PROMPT).unwrap();
    assert!(matches!(fault, CameraError::Device(DeviceError::Disconnected(_))));

    // Readers drain what was queued, then see the channel closed.
    assert_eq!(ends.images.iter().count(), 2);
    handle.shutdown(PROMPT).unwrap();
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_fatal_snap_closes_then_faults() {
    let settings = test_settings(CameraKind::Pco, 2.0, 8, 8);
    let driver = MockFifoDriver::new(8, 8).failing_after(0, DeviceError::Disconnected("power loss".into()));
    let (mut handle, ends) = spawn_pco(&settings, driver);

    handle.send(Command::SnapSingleImage).unwrap();
    let fault = ends.faults.recv_timeout(PROMPT).unwrap();
    assert!(fault.to_string().contains("power loss"));
    wait_for_line(&ends.diagnostics, "camera is closed", PROMPT).expect("closed");

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_lost_snap_is_reported_without_fault() {
    let settings = test_settings(CameraKind::Ids, 2.0, 8, 8);
    let (mut handle, ends) = spawn_ids(&settings, MockBufferDriver::new(8, 8).with_empty_buffers());

    handle.send(Command::SnapSingleImage).unwrap();
    let line = wait_for_line(&ends.diagnostics, "Failed to snap", PROMPT).unwrap();
    assert!(line.contains("Frame lost"));
    assert!(ends.faults.is_empty());
    assert!(ends.images.is_empty());
    assert!(!handle.is_finished());

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_commands_full_is_reported_to_sender() {
    let mut settings = test_settings(CameraKind::Pco, 2.0, 8, 8);
    settings.channels.commands = 10;
    let driver = MockFifoDriver::new(8, 8).with_frame_delay(Duration::from_millis(300));
    let (mut handle, ends) = spawn_pco(&settings, driver);

    handle.send(Command::StartLiveStream).unwrap();
    wait_for_line(&ends.diagnostics, "Live stream started", PROMPT).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    for _ in 0..10 {
        handle.send(Command::GetStatus).unwrap();
    }
    assert!(matches!(handle.send(Command::GetStatus), Err(CameraError::CommandsFull)));

    handle.shutdown(PROMPT).unwrap();
}

#[test]
fn test_driver_fault_while_streaming_closes_device() {
    let settings = test_settings(CameraKind::Pco, 2.0, 8, 8);
    let probe = Arc::new(DriverProbe::default());
    let driver = MockFifoDriver::new(8, 8)
        .with_probe(probe.clone())
        .failing_after(2, DeviceError::Driver("sensor bus fault".into()));
    let (mut handle, ends) = spawn_pco(&settings, driver);

    handle.send(Command::StartLiveStream).unwrap();
    let fault = ends.faults.recv_timeout(PROMPT).unwrap();
    assert!(matches!(fault, CameraError::Device(DeviceError::Driver(_))));
    let line = wait_for_line(&ends.diagnostics, "camera is closed", PROMPT).expect("closed");
    assert_eq!(line, "The PCO camera is closed");

    handle.shutdown(PROMPT).unwrap();
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_snap_timeout_closes_then_faults() {
    let settings = test_settings(CameraKind::Pco, 2.0, 8, 8);
    let probe = Arc::new(DriverProbe::default());
    let driver = MockFifoDriver::new(8, 8)
        .with_probe(probe.clone())
        .with_frame_delay(Duration::from_secs(2));
    let (mut handle, ends) = spawn_pco(&settings, driver);

    handle.send(Command::SnapSingleImage).unwrap();
    let fault = ends.faults.recv_timeout(PROMPT).unwrap();
    assert!(matches!(fault, CameraError::Device(DeviceError::Timeout(_))));
    let line = wait_for_line(&ends.diagnostics, "Camera error", PROMPT).unwrap();
    assert!(line.contains("Timed out after 500ms"));
    wait_for_line(&ends.diagnostics, "camera is closed", PROMPT).expect("closed");

    handle.shutdown(PROMPT).unwrap();
    assert_eq!(probe.closes(), 1);
    assert!(ends.images.is_empty());
}
