//! cpal implementation of the capture backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, warn};

use super::backend::{
    BufferCallback, CallbackFlow, CaptureBackend, CaptureStream, ErrorCallback, StreamSpec,
};
use super::devices::{device_name, CaptureDevice};
use super::error::CaptureError;

/// Opens 16-bit input streams on the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

struct CpalStream {
    stream: cpal::Stream,
    name: String,
}

impl CaptureBackend for CpalBackend {
    fn open_stream(
        &self,
        device: &CaptureDevice,
        spec: &StreamSpec,
        mut on_buffer: BufferCallback,
        mut on_error: ErrorCallback,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let cpal_device = host
            .devices()
            .map_err(CaptureError::device)?
            .nth(device.index)
            .ok_or_else(|| {
                CaptureError::Device(format!("no device at index {}", device.index))
            })?;

        let name = device_name(&cpal_device);
        if name != device.display_name {
            warn!(
                "Device at index {} is now '{}' (expected '{}')",
                device.index, name, device.display_name
            );
        }

        let config = cpal::StreamConfig {
            channels: spec.format.channels,
            sample_rate: cpal::SampleRate(spec.format.sample_rate),
            buffer_size: match spec.buffer_frames {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        // Once the recorder says Complete, later buffers are dropped until the
        // session stops the stream.
        let mut complete = false;
        let data_fn = move |data: &[i16], _: &cpal::InputCallbackInfo| {
            if complete {
                return;
            }
            if on_buffer(data) == CallbackFlow::Complete {
                complete = true;
            }
        };

        let err_fn = move |err: cpal::StreamError| match err {
            cpal::StreamError::DeviceNotAvailable => {
                error!("Capture device disappeared");
                on_error(CaptureError::Device("device no longer available".into()));
            }
            other => warn!("Capture stream error: {}", other),
        };

        let stream = cpal_device
            .build_input_stream(&config, data_fn, err_fn, None)
            .map_err(CaptureError::device)?;

        info!(
            "Opened input stream on '{}' ({} Hz, {} ch, buffer {:?})",
            name, spec.format.sample_rate, spec.format.channels, spec.buffer_frames
        );

        Ok(Box::new(CpalStream { stream, name }))
    }
}

impl CaptureStream for CpalStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.stream.play().map_err(CaptureError::device)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        debug!("Stopping input stream on '{}'", self.name);
        self.stream.pause().map_err(CaptureError::device)
    }
}
