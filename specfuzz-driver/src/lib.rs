//! The driver process and its control client.
//!
//! The driver listens on a Unix domain socket and answers framed requests against a single shared
//! [`Driver`](specfuzz_runtime::Driver) session. The client side connects with retries, sends one
//! request, and reads one reply.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

pub use crate::client::{connect_and_send, Client, ClientError, Connector, UnixConnector};
pub use crate::config::{ClientConfig, DriverConfig};
pub use crate::dispatcher::{Dispatcher, Outcome, Session, State};
pub use crate::protocol::{ErrorKind, ErrorReport, LoadRequest, Reply, Request, Response};
pub use crate::server::Server;
pub use crate::transport::{Channel, TransportError, DEFAULT_MAX_FRAME};
