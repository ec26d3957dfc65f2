use crate::audio::sink::factory::{DEFAULT_MP3_BITRATE_KBPS, DEFAULT_OPUS_BITRATE};
use crate::audio::sink::mp3::SUPPORTED_BITRATES_KBPS;
use crate::audio::{AudioFormat, EncodingSettings, PcmFormat, StreamSpec};
use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Sample rates the Opus encoder accepts.
const OPUS_SAMPLE_RATES: &[u32] = &[8_000, 12_000, 16_000, 24_000, 48_000];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub encoding: EncodingConfig,
    pub output: OutputConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per hardware buffer. 0 lets the device choose.
    pub buffer_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub format: AudioFormat,
    /// Opus bitrate target in bits per second.
    pub opus_bitrate: i32,
    pub mp3_bitrate_kbps: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for recordings (default: the data directory's `recordings/`).
    pub directory: Option<String>,
    /// Base file name; files are written as `<base>_<n>.<ext>`.
    /// Defaults to `session_<timestamp>`.
    pub base_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Serve POST /break, POST /stop and GET /status while recording.
    pub enabled: bool,
    pub port: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let pcm = PcmFormat::default();
        Self {
            sample_rate: pcm.sample_rate,
            channels: pcm.channels,
            buffer_frames: 1024,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::Opus,
            opus_bitrate: DEFAULT_OPUS_BITRATE,
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3838,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = Self::parse(&content)?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        std::fs::write(&config_path, self.to_toml()?).context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Reject settings the encoders cannot honor.
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if !(1..=2).contains(&capture.channels) {
            bail!(
                "capture.channels must be 1 or 2, got {}",
                capture.channels
            );
        }
        if capture.sample_rate == 0 {
            bail!("capture.sample_rate must be positive");
        }
        self.check_format(self.encoding.format)?;
        if self.encoding.opus_bitrate <= 0 {
            bail!(
                "encoding.opus_bitrate must be positive, got {}",
                self.encoding.opus_bitrate
            );
        }
        if !SUPPORTED_BITRATES_KBPS.contains(&self.encoding.mp3_bitrate_kbps) {
            bail!(
                "encoding.mp3_bitrate_kbps must be one of {:?}, got {}",
                SUPPORTED_BITRATES_KBPS,
                self.encoding.mp3_bitrate_kbps
            );
        }
        Ok(())
    }

    /// Check that `format` can encode the configured capture format.
    pub fn check_format(&self, format: AudioFormat) -> Result<()> {
        if format == AudioFormat::Opus && !OPUS_SAMPLE_RATES.contains(&self.capture.sample_rate) {
            bail!(
                "opus needs capture.sample_rate in {:?}, got {}",
                OPUS_SAMPLE_RATES,
                self.capture.sample_rate
            );
        }
        Ok(())
    }

    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat::new(self.capture.sample_rate, self.capture.channels)
    }

    pub fn stream_spec(&self) -> StreamSpec {
        let buffer_frames = match self.capture.buffer_frames {
            0 => None,
            frames => Some(frames),
        };
        StreamSpec::new(self.pcm_format(), buffer_frames)
    }

    pub fn encoding_settings(&self) -> EncodingSettings {
        EncodingSettings {
            opus_bitrate: self.encoding.opus_bitrate,
            mp3_bitrate_kbps: self.encoding.mp3_bitrate_kbps,
        }
    }

    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.output.directory {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => global::recordings_dir(),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
