//! CLI handler for a recording session.
//!
//! The session runs on a blocking task. Operator commands arrive from
//! stdin, Ctrl-C, and the optional control server, and all flow through
//! one channel into the loop below.

use crate::audio::{
    CaptureDevice, CaptureSession, CpalBackend, DeviceEnumerator, EncoderSinkFactory,
    SequentialPaths, SessionControl,
};
use crate::config::Config;
use crate::control::{ControlCommand, ControlServer};
use anyhow::{anyhow, bail, Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::args::RecordCliArgs;

pub async fn handle_record_command(args: RecordCliArgs, config: Config) -> Result<()> {
    let format = args.format.unwrap_or(config.encoding.format);
    config.check_format(format)?;

    let device = resolve_device(&DeviceEnumerator::new(), args.device)?;

    let output_dir = match &args.output {
        Some(dir) => PathBuf::from(dir),
        None => config.output_dir()?,
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let base_name = args
        .name
        .clone()
        .or_else(|| config.output.base_name.clone())
        .unwrap_or_else(default_base_name);
    let paths = SequentialPaths::new(output_dir.join(&base_name), format.extension());

    let pcm = config.pcm_format();
    let factory = Arc::new(EncoderSinkFactory::new(pcm, config.encoding_settings()));
    let session = CaptureSession::new(CpalBackend::new(), factory, config.stream_spec());
    let control = session.control();

    let (tx, mut rx) = mpsc::channel::<ControlCommand>(16);

    if config.control.enabled && !args.no_control {
        let server = ControlServer::new(config.control.port, tx.clone(), control.status_handle());
        if let Err(e) = spawn_control_server(server).await {
            warn!("{:#}", e);
            println!(
                "Warning: HTTP control is unavailable ({:#}). Use the keyboard commands below.",
                e
            );
        }
    }
    spawn_stdin_reader(tx);

    println!(
        "Recording '{}' as {} into {}",
        device.display_name,
        format,
        output_dir.display()
    );
    println!("Press Enter for a break, 'q' + Enter (or Ctrl-C) to stop.");

    let mut capture = tokio::task::spawn_blocking(move || session.run(&device, format, paths));

    let result = loop {
        tokio::select! {
            result = &mut capture => break result.context("Capture task panicked")?,
            Some(command) = rx.recv() => apply(&control, command),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping recording");
                control.cancel();
            }
        }
    };

    match result {
        Ok(report) => {
            println!("\nRecorded {} file(s):", report.files.len());
            for file in &report.files {
                println!(
                    "  {} ({:.1}s)",
                    file.path.display(),
                    pcm.duration_secs(file.samples)
                );
            }
            Ok(())
        }
        Err(err) => {
            let status = control.status();
            if !status.completed_files.is_empty() {
                println!("\nFiles written before the failure:");
                for path in &status.completed_files {
                    println!("  {}", path.display());
                }
            }
            Err(err).context("Recording failed")
        }
    }
}

fn apply(control: &SessionControl, command: ControlCommand) {
    match command {
        ControlCommand::Break => {
            info!("Break requested");
            control.request_break();
        }
        ControlCommand::Stop => {
            info!("Stop requested");
            control.cancel();
        }
    }
}

/// Bind the control server and serve it in the background.
async fn spawn_control_server(server: ControlServer) -> Result<()> {
    let listener = server.bind().await?;
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("Control server failed: {}", e);
        }
    });
    Ok(())
}

/// Read operator commands from stdin on a plain thread so a pending read
/// never holds the runtime open at exit.
fn spawn_stdin_reader(tx: mpsc::Sender<ControlCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let command = match parse_command(&line) {
                Some(command) => command,
                None => {
                    warn!("Unknown command {:?} (Enter = break, q = stop)", line.trim());
                    continue;
                }
            };
            if tx.blocking_send(command).is_err() {
                break;
            }
        }
    });
}

fn parse_command(line: &str) -> Option<ControlCommand> {
    match line.trim().to_lowercase().as_str() {
        "" | "b" | "break" => Some(ControlCommand::Break),
        "q" | "s" | "stop" | "quit" => Some(ControlCommand::Stop),
        _ => None,
    }
}

fn resolve_device(enumerator: &DeviceEnumerator, index: Option<usize>) -> Result<CaptureDevice> {
    if let Some(index) = index {
        return enumerator
            .find(index)?
            .ok_or_else(|| anyhow!("No input device with index {index}; see `songbreak devices`"));
    }

    if let Some(device) = enumerator.default_input_device()? {
        return Ok(device);
    }
    match enumerator.list_input_devices()?.next() {
        Some(device) => Ok(device),
        None => bail!("No input devices available"),
    }
}

fn default_base_name() -> String {
    format!("session_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}
