use chrono::{DateTime, Local};
use std::path::PathBuf;

/// One marker-delimited binary payload received from the device, already
/// persisted to disk.
#[derive(Debug, Clone)]
pub struct FrameCapture {
    /// Where the payload was written
    pub path: PathBuf,
    /// Declared payload size from the header line
    pub size: usize,
    /// Bytes actually received before the payload window closed
    pub bytes_read: usize,
    /// Capture timestamp
    pub timestamp: DateTime<Local>,
}

impl FrameCapture {
    /// A partial frame timed out before reaching its declared size but its
    /// end marker still matched. It is forwarded downstream regardless.
    pub fn is_partial(&self) -> bool {
        self.bytes_read < self.size
    }
}

/// Parse a `<label>:<decimal-size>` header line. Rejects a missing
/// separator, non-numeric digits, and negative sizes.
pub(crate) fn parse_size_header(line: &str) -> Option<usize> {
    let (_, value) = line.split_once(':')?;
    value.trim().parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_headers() {
        assert_eq!(parse_size_header("IMG:10"), Some(10));
        assert_eq!(parse_size_header("SIZE: 2048"), Some(2048));
        assert_eq!(parse_size_header("IMG:0"), Some(0));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(parse_size_header("IMG"), None);
        assert_eq!(parse_size_header("IMG:"), None);
        assert_eq!(parse_size_header("IMG:abc"), None);
        assert_eq!(parse_size_header("IMG:-1"), None);
        assert_eq!(parse_size_header(""), None);
    }
}
