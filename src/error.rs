use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlantguardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("System error: {message}")]
    System { message: String },
}

impl PlantguardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Reasons a receive cycle ends without a frame. These are cycle-local:
/// the orchestrator logs them and retries on the next cycle.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("timed out waiting for start marker")]
    StartTimeout,

    #[error("malformed size header: {line:?}")]
    BadHeader { line: String },

    #[error("end marker not received, got: {line:?}")]
    MissingEndMarker { line: String },
}

/// Frame persistence failures.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to create capture directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write frame {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Classification call failures. Absorbed inside `ClassificationClient`:
/// every variant resolves to an `Unknown` result rather than propagating.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("could not read capture file: {0}")]
    Read(#[from] std::io::Error),
}

/// Failures talking back to the capture device.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("command write failed: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlantguardError>;
