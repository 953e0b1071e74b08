//! The control client: connects to a running driver, sends one request, and reads the reply.

use crate::config::ClientConfig;
use crate::protocol::{ErrorReport, Request, Response};
use crate::transport::{Channel, TransportError};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not connect after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("Transport error: {}", _0)]
    Transport(#[from] TransportError),
    /// The driver answered with a failure code.
    #[error("Request failed with code {}: {}", .code, describe(.report))]
    Failed {
        code: i32,
        report: Option<ErrorReport>,
    },
}

fn describe(report: &Option<ErrorReport>) -> String {
    report
        .as_ref()
        .map_or_else(|| "no details".to_owned(), |r| r.to_string())
}

/// Opens byte streams to a driver.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self) -> io::Result<Self::Stream>;
}

/// Connects to a driver listening on a Unix domain socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        UnixConnector { path: path.into() }
    }
}

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self) -> io::Result<UnixStream> {
        UnixStream::connect(&self.path)
    }
}

/// The delay after failed attempt `attempt` (counting from 1).
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base * attempt.saturating_pow(3)
}

pub struct Client<C> {
    connector: C,
    config: ClientConfig,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C, config: ClientConfig) -> Self {
        Client { connector, config }
    }

    /// Open a channel, retrying with a cubic backoff between attempts.
    pub fn connect(&self) -> Result<Channel<C::Stream>, ClientError> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connector.connect() {
                Ok(stream) => {
                    debug!(attempt = attempt, "connected");
                    return Ok(Channel::new(stream).with_max_frame(self.config.max_frame));
                }
                Err(e) if attempt >= attempts => {
                    return Err(ClientError::Connection {
                        attempts,
                        source: e,
                    })
                }
                Err(e) => {
                    let delay = backoff(self.config.backoff_base, attempt);
                    warn!(
                        attempt = attempt,
                        error = %e,
                        delay = ?delay,
                        "connect failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Send `request` and wait for its response. `Exit` has no response, so it returns `None`.
    pub fn request(&self, request: &Request) -> Result<Option<Response>, ClientError> {
        let mut channel = self.connect()?;
        channel.send(request)?;
        if let Request::Exit = request {
            return Ok(None);
        }
        Ok(Some(channel.receive()?))
    }

    /// Send `request` and return the response's concatenated output.
    ///
    /// A failure reply becomes `ClientError::Failed`; `Exit` yields an empty string.
    pub fn connect_and_send(&self, request: &Request) -> Result<String, ClientError> {
        let reply = match self.request(request)? {
            None => return Ok(String::new()),
            Some(response) => response.into_reply(),
        };
        if !reply.is_success() {
            return Err(ClientError::Failed {
                code: reply.code,
                report: reply.error,
            });
        }
        Ok(reply.output_text())
    }
}

/// Send one request to the driver at `address` with the default retry policy.
pub fn connect_and_send(request: &Request, address: &Path) -> Result<String, ClientError> {
    Client::new(UnixConnector::new(address), ClientConfig::default()).connect_and_send(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubic_backoff() {
        let base = Duration::from_millis(50);
        assert_eq!(backoff(base, 1), Duration::from_millis(50));
        assert_eq!(backoff(base, 2), Duration::from_millis(400));
        assert_eq!(backoff(base, 3), Duration::from_millis(1350));
    }
}
