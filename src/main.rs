//! Command-line front-end: runs one camera session.
//!
//! ```text
//! camera_ctrl --kind PCO --exposure-ms 20 \
//!     --command "Crop Image=0,0,64,64" --command "Snap single image" --live-ms 500
//! ```

use anyhow::{Context, Result};
use camera_ctrl::camera_actor::CameraActor;
use camera_ctrl::config::Settings;
use camera_ctrl::error::CameraError;
use camera_ctrl::messages::Command;
use camera_ctrl::supervisor::{count_images, watch_faults, DiagnosticsPrinter};
use camera_ctrl::CameraKind;
use clap::Parser;
use figment::providers::Serialized;
use flume::Sender;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "camera_ctrl", version, about = "Drive a camera through its device actor")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera variant: Simulated, PCO or IDS
    #[arg(long)]
    kind: Option<CameraKind>,

    /// Exposure time in milliseconds
    #[arg(long)]
    exposure_ms: Option<f64>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Command to send, `Name` or `Name=a,b,...` (repeatable)
    #[arg(short = 'C', long = "command")]
    commands: Vec<String>,

    /// Run the live stream for this many milliseconds after the commands
    #[arg(long, default_value_t = 0)]
    live_ms: u64,

    /// Log every diagnostic line at info level
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut figment = Settings::figment(cli.config.as_deref());
    if let Some(kind) = cli.kind {
        figment = figment.merge(Serialized::default("camera.kind", kind));
    }
    if let Some(exposure_ms) = cli.exposure_ms {
        figment = figment.merge(Serialized::default("camera.exposure_ms", exposure_ms));
    }
    if let Some(width) = cli.width {
        figment = figment.merge(Serialized::default("camera.width", width));
    }
    if let Some(height) = cli.height {
        figment = figment.merge(Serialized::default("camera.height", height));
    }
    Settings::from_figment(figment).context("Failed to load configuration")
}

/// `Name` or `Name=a,b,...`.
fn parse_command(text: &str) -> Result<Command> {
    let Some((name, args)) = text.split_once('=') else {
        return Ok(text.parse()?);
    };
    let payload = args
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid parameter '{value}' in '{text}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Command::parameterized(name.trim(), &payload)?)
}

async fn run_session(commands: Sender<Command>, script: Vec<Command>, live: Duration) -> Result<()> {
    for cmd in script {
        debug!(%cmd, "Sending command");
        commands
            .send_async(cmd)
            .await
            .map_err(|_| CameraError::ActorStopped)?;
    }
    if !live.is_zero() {
        commands
            .send_async(Command::StartLiveStream)
            .await
            .map_err(|_| CameraError::ActorStopped)?;
        tokio::time::sleep(live).await;
        commands
            .send_async(Command::StopLiveStream)
            .await
            .map_err(|_| CameraError::ActorStopped)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let settings = load_settings(&cli)?;
    let script = cli
        .commands
        .iter()
        .map(String::as_str)
        .map(parse_command)
        .collect::<Result<Vec<_>>>()?;
    info!(
        kind = %settings.camera.kind,
        width = settings.camera.width,
        height = settings.camera.height,
        exposure_ms = settings.camera.exposure_ms,
        "Starting camera session"
    );

    let (mut handle, ends) = CameraActor::spawn(&settings)?;
    let printer = tokio::spawn(DiagnosticsPrinter::new(cli.verbose).run(ends.diagnostics.clone()));
    let reader = tokio::spawn(count_images(ends.images.clone()));
    let faults = watch_faults(ends.faults.clone());
    tokio::pin!(faults);

    let session = run_session(handle.commands(), script, Duration::from_millis(cli.live_ms));
    let outcome = tokio::select! {
        result = session => result.map(|()| None),
        fault = &mut faults => Ok(fault),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing the camera");
            Ok(None)
        }
    };

    let timeout = settings.timing.shutdown_timeout();
    let shutdown = tokio::task::spawn_blocking(move || handle.shutdown(timeout)).await?;
    match shutdown {
        Ok(()) => {
            let seen = printer.await?;
            let tally = reader.await?;
            info!(
                frames = tally.frames,
                placeholders = tally.placeholders,
                diagnostics = seen,
                "Camera session finished"
            );
        }
        Err(err) => {
            warn!(error = %err, "Camera worker did not shut down cleanly");
            printer.abort();
            reader.abort();
        }
    }

    match outcome? {
        Some(err) => Err(err).context("Camera session ended with a fault"),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_forms() {
        assert!(matches!(parse_command("Snap single image"), Ok(Command::SnapSingleImage)));
        assert!(matches!(
            parse_command("Set exposure time=12.5"),
            Ok(Command::SetExposure(ms)) if ms == 12.5
        ));
        assert!(matches!(
            parse_command("Change simulate picture sizes to:=64, 48"),
            Ok(Command::ResizeSimulated { width: 64, height: 48 })
        ));
        assert!(parse_command("Crop Image=1,2,x,4").is_err());
        assert!(parse_command("Warp drive").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["camera_ctrl", "--kind", "IDS", "--width", "320", "--exposure-ms", "0"]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.camera.kind, CameraKind::Ids);
        assert_eq!(settings.camera.width, 320);
        assert_eq!(settings.camera.exposure_ms, 1.0);
    }
}
