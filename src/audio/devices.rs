//! Capture device enumeration via cpal.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use tracing::debug;

use super::error::CaptureError;

/// An input-capable device as reported by the host.
///
/// `index` is the device's position in the host's full device list and is
/// what the capture backend uses to reopen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDevice {
    pub index: usize,
    pub display_name: String,
}

impl std::fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Lists input devices on the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self
    }

    /// Query the host and lazily yield every device with at least one input channel.
    ///
    /// Each call re-queries the host.
    pub fn list_input_devices(
        &self,
    ) -> Result<impl Iterator<Item = CaptureDevice>, CaptureError> {
        let host = cpal::default_host();
        let devices = host.devices().map_err(CaptureError::device)?;

        Ok(devices
            .enumerate()
            .filter(|(_, device)| has_input_channels(device))
            .map(|(index, device)| CaptureDevice {
                index,
                display_name: device_name(&device),
            }))
    }

    /// The host's default input device, if it has one.
    pub fn default_input_device(&self) -> Result<Option<CaptureDevice>, CaptureError> {
        let host = cpal::default_host();
        let Some(default) = host.default_input_device() else {
            return Ok(None);
        };
        let default_name = device_name(&default);
        debug!("Default input device: {}", default_name);

        let mut inputs = self.list_input_devices()?;
        Ok(inputs.find(|device| device.display_name == default_name))
    }

    /// Look a device up by its enumeration index.
    pub fn find(&self, index: usize) -> Result<Option<CaptureDevice>, CaptureError> {
        let mut inputs = self.list_input_devices()?;
        Ok(inputs.find(|device| device.index == index))
    }
}

fn has_input_channels(device: &cpal::Device) -> bool {
    device
        .supported_input_configs()
        .map(|mut configs| configs.any(|config| config.channels() > 0))
        .unwrap_or(false)
}

pub(crate) fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "unknown".to_string())
}
