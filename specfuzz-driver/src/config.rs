use crate::transport::DEFAULT_MAX_FRAME;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SOCKET: &str = "/tmp/specfuzz-driver.sock";

/// Configuration for the driver's listening side.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub socket: PathBuf,
    pub max_frame: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            socket: PathBuf::from(DEFAULT_SOCKET),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

/// Configuration for the control client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection attempts before giving up. Always at least one attempt is made.
    pub attempts: u32,
    /// The delay after attempt `n` is `backoff_base * n^3`.
    pub backoff_base: Duration,
    pub max_frame: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            attempts: 3,
            backoff_base: Duration::from_millis(50),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}
