use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlantguardConfig {
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    pub classifier: ClassifierConfig,
    pub capture: CaptureConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    /// Serial device path (e.g., /dev/ttyUSB0)
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Per-read poll timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    /// Line token marking the start of a frame
    #[serde(default = "default_start_marker")]
    pub start_marker: String,

    /// Line token marking the end of a frame
    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    /// Window for the start marker to appear, in seconds
    #[serde(default = "default_start_window_secs")]
    pub start_window_secs: u64,

    /// Window for the payload to arrive, in seconds (measured independently
    /// of the start window)
    #[serde(default = "default_payload_window_secs")]
    pub payload_window_secs: u64,

    /// Maximum payload bytes requested per read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Reply token confirming spray activation
    #[serde(default = "default_ack_token")]
    pub ack_token: String,

    /// Delay after a command write before draining replies, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Classification endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Directory for captured frames
    #[serde(default = "default_capture_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    /// Delay between cycles, in seconds
    #[serde(default = "default_cycle_delay_secs")]
    pub cycle_delay_secs: u64,

    /// Backoff after a failed cycle, in seconds
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

impl PlantguardConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("plantguard.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("serial.port", default_serial_port())?
            .set_default("serial.baud", default_baud())?
            .set_default("serial.poll_timeout_ms", default_poll_timeout_ms())?
            .set_default("protocol.start_marker", default_start_marker())?
            .set_default("protocol.end_marker", default_end_marker())?
            .set_default("protocol.start_window_secs", default_start_window_secs())?
            .set_default(
                "protocol.payload_window_secs",
                default_payload_window_secs(),
            )?
            .set_default("protocol.chunk_size", default_chunk_size() as i64)?
            .set_default("protocol.ack_token", default_ack_token())?
            .set_default("protocol.settle_ms", default_settle_ms())?
            .set_default("classifier.endpoint", default_endpoint())?
            .set_default(
                "classifier.request_timeout_secs",
                default_request_timeout_secs(),
            )?
            .set_default("capture.path", default_capture_path())?
            .set_default("runtime.cycle_delay_secs", default_cycle_delay_secs())?
            .set_default("runtime.error_backoff_secs", default_error_backoff_secs())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PLANTGUARD_ prefix
            .add_source(Environment::with_prefix("PLANTGUARD").separator("_"))
            .build()?;

        let config: PlantguardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Message(
                "Serial port must not be empty".to_string(),
            ));
        }

        if self.serial.baud == 0 {
            return Err(ConfigError::Message(
                "Serial baud rate must be greater than 0".to_string(),
            ));
        }

        if self.protocol.start_marker.is_empty() || self.protocol.end_marker.is_empty() {
            return Err(ConfigError::Message(
                "Frame markers must not be empty".to_string(),
            ));
        }

        if self.protocol.start_marker == self.protocol.end_marker {
            return Err(ConfigError::Message(
                "Start and end markers must differ".to_string(),
            ));
        }

        if self.protocol.start_window_secs == 0 || self.protocol.payload_window_secs == 0 {
            return Err(ConfigError::Message(
                "Protocol windows must be greater than 0".to_string(),
            ));
        }

        if self.protocol.chunk_size == 0 {
            return Err(ConfigError::Message(
                "Protocol chunk size must be greater than 0".to_string(),
            ));
        }

        if !self.classifier.endpoint.starts_with("http://")
            && !self.classifier.endpoint.starts_with("https://")
        {
            return Err(ConfigError::Message(
                "Classifier endpoint must be an http(s) URL".to_string(),
            ));
        }

        if self.classifier.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Classifier request timeout must be greater than 0".to_string(),
            ));
        }

        if self.capture.path.is_empty() {
            return Err(ConfigError::Message(
                "Capture path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PlantguardConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                port: default_serial_port(),
                baud: default_baud(),
                poll_timeout_ms: default_poll_timeout_ms(),
            },
            protocol: ProtocolConfig {
                start_marker: default_start_marker(),
                end_marker: default_end_marker(),
                start_window_secs: default_start_window_secs(),
                payload_window_secs: default_payload_window_secs(),
                chunk_size: default_chunk_size(),
                ack_token: default_ack_token(),
                settle_ms: default_settle_ms(),
            },
            classifier: ClassifierConfig {
                endpoint: default_endpoint(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            capture: CaptureConfig {
                path: default_capture_path(),
            },
            runtime: RuntimeConfig {
                cycle_delay_secs: default_cycle_delay_secs(),
                error_backoff_secs: default_error_backoff_secs(),
            },
        }
    }
}

// Default value functions
fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud() -> u32 {
    115200
}
fn default_poll_timeout_ms() -> u64 {
    5000
}

fn default_start_marker() -> String {
    "START_IMAGE".to_string()
}
fn default_end_marker() -> String {
    "END_IMAGE".to_string()
}
fn default_start_window_secs() -> u64 {
    30
}
fn default_payload_window_secs() -> u64 {
    30
}
fn default_chunk_size() -> usize {
    1024
}
fn default_ack_token() -> String {
    "SPRAY_SIGNAL_SENT".to_string()
}
fn default_settle_ms() -> u64 {
    500
}

fn default_endpoint() -> String {
    "http://localhost:8000/detect".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}

fn default_capture_path() -> String {
    "captured_images".to_string()
}

fn default_cycle_delay_secs() -> u64 {
    5
}
fn default_error_backoff_secs() -> u64 {
    5
}
