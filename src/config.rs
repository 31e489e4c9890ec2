//! Configuration for both endpoints
//!
//! The client reads a TOML file; the server takes everything from its command
//! line. Defaults on both sides describe the same stream so an unconfigured
//! pair can talk to each other.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::audio::{AudioFormat, ByteOrder, Direction, SampleType};
use crate::constants::*;
use crate::error::{Error, FormatError, Result};

/// Operator-entered format values, resolved into an [`AudioFormat`] each
/// time a device is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSettings {
    pub sample_rate: i64,
    pub channels: i64,
    pub sample_size: i64,
    pub byte_order: ByteOrder,
    pub sample_type: SampleType,
    /// Requested device period; the device may adjust it
    pub period_frames: u32,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE as i64,
            channels: DEFAULT_CHANNELS as i64,
            sample_size: DEFAULT_SAMPLE_SIZE as i64,
            byte_order: ByteOrder::Little,
            sample_type: SampleType::Signed,
            period_frames: DEFAULT_CLIENT_PERIOD_FRAMES,
        }
    }
}

impl FormatSettings {
    /// Validate the raw values and build the descriptor
    pub fn resolve(&self) -> std::result::Result<AudioFormat, FormatError> {
        let sample_rate = u32::try_from(self.sample_rate)
            .ok()
            .filter(|r| *r > 0)
            .ok_or(FormatError::SampleRate(self.sample_rate))?;
        let channels = u16::try_from(self.channels)
            .ok()
            .filter(|c| *c > 0)
            .ok_or(FormatError::Channels(self.channels))?;
        let bits = u16::try_from(self.sample_size)
            .map_err(|_| FormatError::SampleSize(self.sample_size))?;
        if self.period_frames == 0 {
            return Err(FormatError::PeriodFrames);
        }

        let format = AudioFormat::new(sample_rate, channels, bits, self.byte_order, self.sample_type);
        format.validate()?;
        Ok(format)
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames as usize
    }
}

/// Device choice and format for one direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionSettings {
    /// Device id from the directory; unset means the default device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub format: FormatSettings,
}

/// Remote endpoint to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Client configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Outbound gain, 0..=200 percent
    pub input_gain_percent: u32,
    /// Also write received audio to this raw PCM file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<PathBuf>,
    pub server: ServerEndpoint,
    /// Local capture, sent to the remote end
    pub input: DirectionSettings,
    /// Remote audio, played locally
    pub output: DirectionSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            input_gain_percent: 100,
            recording: None,
            server: ServerEndpoint::default(),
            input: DirectionSettings::default(),
            output: DirectionSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Platform config file location, e.g. `~/.config/pcm-duplex/client.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "pcm-duplex", "pcm-duplex")
            .map(|dirs| dirs.config_dir().join(CLIENT_CONFIG_FILE))
    }

    /// Load from `path`, or from the default location. A missing file gives
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn direction(&self, direction: Direction) -> &DirectionSettings {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    pub fn direction_mut(&mut self, direction: Direction) -> &mut DirectionSettings {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }
}

/// Client command line
#[derive(Parser, Debug, Clone)]
#[command(name = "client")]
#[command(about = "Stream local audio to and from a pcm-duplex server", long_about = None)]
pub struct ClientArgs {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Override the configured server host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the configured server port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Connect immediately instead of waiting for a `connect` command
    #[arg(long)]
    pub connect: bool,

    /// Print the available devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

/// Server command line
#[derive(Parser, Debug, Clone)]
#[command(name = "server")]
#[command(about = "Serve one hardware audio device pair over TCP", long_about = None)]
pub struct ServerArgs {
    /// TCP port to listen on
    #[arg(long, short = 'p')]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Capture device (e.g. hw:1,0); omit to disable capture towards the client
    #[arg(long)]
    pub capture_device: Option<String>,

    /// Playback device; omit to disable playback of client audio
    #[arg(long)]
    pub playback_device: Option<String>,

    /// Channel count
    #[arg(long, default_value_t = DEFAULT_CHANNELS)]
    pub channels: u16,

    /// Sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub rate: u32,

    /// Capture period in frames
    #[arg(long, default_value_t = DEFAULT_SERVER_PERIOD_FRAMES)]
    pub period_frames: usize,

    /// Signed little-endian sample size in bits
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub bits: u16,
}

impl ServerArgs {
    /// Stream format shared by capture and playback
    pub fn format(&self) -> std::result::Result<AudioFormat, FormatError> {
        let format = AudioFormat::new(
            self.rate,
            self.channels,
            self.bits,
            ByteOrder::Little,
            SampleType::Signed,
        );
        format.validate()?;
        if self.period_frames == 0 {
            return Err(FormatError::PeriodFrames);
        }
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let format = FormatSettings::default().resolve().unwrap();
        assert_eq!(format, AudioFormat::s16le(44100, 2));
    }

    #[test]
    fn test_resolve_rejects_operator_values() {
        let mut settings = FormatSettings::default();
        settings.sample_rate = -8000;
        assert_eq!(settings.resolve(), Err(FormatError::SampleRate(-8000)));

        let mut settings = FormatSettings::default();
        settings.channels = 0;
        assert_eq!(settings.resolve(), Err(FormatError::Channels(0)));

        let mut settings = FormatSettings::default();
        settings.sample_size = 20;
        assert_eq!(settings.resolve(), Err(FormatError::SampleSize(20)));

        let mut settings = FormatSettings::default();
        settings.period_frames = 0;
        assert_eq!(settings.resolve(), Err(FormatError::PeriodFrames));
    }

    #[test]
    fn test_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            input_gain_percent = 150

            [server]
            host = "10.0.0.2"

            [output.format]
            sample_rate = 16000
            channels = 1
            byte_order = "big"
            sample_type = "unsigned"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "10.0.0.2");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.input_gain_percent, 150);
        let out = config.output.format.resolve().unwrap();
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.byte_order, ByteOrder::Big);
        assert_eq!(out.sample_type, SampleType::Unsigned);
        assert_eq!(config.input, DirectionSettings::default());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("[server]\nport = \"nope\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CLIENT_CONFIG_FILE);

        let mut config = ClientConfig::default();
        config.input.device = Some("USB Mic".into());
        config.recording = Some(PathBuf::from("/tmp/remote.pcm"));
        config.save(&path).unwrap();

        assert_eq!(ClientConfig::load(Some(&path)).unwrap(), config);
        let missing = dir.path().join("missing.toml");
        assert_eq!(ClientConfig::load(Some(&missing)).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_server_args_require_port() {
        assert!(ServerArgs::try_parse_from(["server"]).is_err());

        let args = ServerArgs::try_parse_from([
            "server",
            "--port",
            "7000",
            "--capture-device",
            "hw:1,0",
            "--channels",
            "1",
        ])
        .unwrap();
        assert_eq!(args.port, 7000);
        assert_eq!(args.capture_device.as_deref(), Some("hw:1,0"));
        assert!(args.playback_device.is_none());
        assert_eq!(args.format().unwrap(), AudioFormat::s16le(DEFAULT_SAMPLE_RATE, 1));
        assert_eq!(args.period_frames, DEFAULT_SERVER_PERIOD_FRAMES);
    }
}
