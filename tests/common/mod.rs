//! Common test utilities for camera_ctrl integration tests
//!
//! This module provides reusable test helpers for:
//! - Settings tuned for fast tests
//! - Waiting for a specific diagnostic line
//! - Spawning actors around mock drivers

#![allow(dead_code)] // Utilities may not all be used by every test binary

use camera_ctrl::adapters::mock::{MockBufferDriver, MockFifoDriver};
use camera_ctrl::adapters::{AdapterSettings, DeviceAdapter, IdsCamera, PcoCamera};
use camera_ctrl::camera_actor::{CameraActor, CameraHandle};
use camera_ctrl::channels::CallerEnds;
use camera_ctrl::config::Settings;
use camera_ctrl::messages::Diagnostic;
use camera_ctrl::CameraKind;
use flume::Receiver;
use std::time::{Duration, Instant};

/// Generous bound for anything that should happen "promptly".
pub const PROMPT: Duration = Duration::from_secs(2);

/// Settings with a short tick and a diagnostics queue large enough that
/// tests never lose a line.
pub fn test_settings(kind: CameraKind, exposure_ms: f64, width: u32, height: u32) -> Settings {
    let mut settings = Settings::default();
    settings.camera.kind = kind;
    settings.camera.exposure_ms = exposure_ms;
    settings.camera.width = width;
    settings.camera.height = height;
    settings.channels.diagnostics = 1024;
    settings.timing.tick_ms = 10;
    settings.timing.acquire_timeout_ms = 500;
    settings
}

/// Block until a diagnostic containing `needle` arrives.
pub fn wait_for_line(diagnostics: &Receiver<Diagnostic>, needle: &str, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    while let Ok(line) = diagnostics.recv_deadline(deadline) {
        if line.text.contains(needle) {
            return Some(line.text);
        }
    }
    None
}

fn launched(handle: CameraHandle, ends: CallerEnds) -> (CameraHandle, CallerEnds) {
    wait_for_line(&ends.diagnostics, "worker has been launched", PROMPT).expect("worker launched");
    (handle, ends)
}

/// Spawn an actor and wait until its worker reports it is running.
pub fn spawn_ready(settings: &Settings) -> (CameraHandle, CallerEnds) {
    let (handle, ends) = CameraActor::spawn(settings).expect("spawn camera actor");
    launched(handle, ends)
}

/// Spawn a PCO actor around `driver` and wait until it runs.
pub fn spawn_pco(settings: &Settings, driver: MockFifoDriver) -> (CameraHandle, CallerEnds) {
    let adapter_settings = AdapterSettings::from_config(&settings.camera, &settings.timing);
    let connector = driver.connector();
    let (handle, ends) = CameraActor::spawn_with(
        settings,
        Box::new(move || Box::new(PcoCamera::new(&adapter_settings, connector)) as Box<dyn DeviceAdapter>),
    )
    .expect("spawn camera actor");
    launched(handle, ends)
}

/// Spawn an IDS actor around `driver` and wait until it runs.
pub fn spawn_ids(settings: &Settings, driver: MockBufferDriver) -> (CameraHandle, CallerEnds) {
    let adapter_settings = AdapterSettings::from_config(&settings.camera, &settings.timing);
    let connector = driver.connector();
    let (handle, ends) = CameraActor::spawn_with(
        settings,
        Box::new(move || Box::new(IdsCamera::new(&adapter_settings, connector)) as Box<dyn DeviceAdapter>),
    )
    .expect("spawn camera actor");
    launched(handle, ends)
}
