//! CLI handler for listing input devices.

use crate::audio::DeviceEnumerator;
use anyhow::{Context, Result};

pub fn handle_devices_command() -> Result<()> {
    let enumerator = DeviceEnumerator::new();
    let default = enumerator
        .default_input_device()
        .context("Failed to query default input device")?;
    let devices: Vec<_> = enumerator
        .list_input_devices()
        .context("Failed to enumerate audio devices")?
        .collect();

    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("=== Input Devices ===\n");
    for device in &devices {
        let marker = if default.as_ref() == Some(device) {
            " (default)"
        } else {
            ""
        };
        println!("{:>3}: {}{}", device.index, device.display_name, marker);
    }

    Ok(())
}
