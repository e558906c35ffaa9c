//! Byte sinks that deliver encoded measurements to InfluxDB, and the
//! retrying [`Sender`](sender::Sender) in front of them.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

pub mod http;
pub mod sender;
pub mod tcp;

pub use http::HttpWriter;
pub use sender::Sender;
pub use tcp::TcpWriter;

#[derive(Debug, Display)]
pub enum WriterError {
    #[display("failed to connect to {endpoint}")]
    Connect { endpoint: String },
    #[display("failed to write to {endpoint}")]
    Write { endpoint: String },
    #[display("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },
    #[display("failed to close the connection")]
    Close,
    #[display("failed to set up the HTTP client")]
    Client,
}

impl Error for WriterError {}

/// A destination for line protocol payloads.
pub trait InfluxDbWriter: Send {
    /// Delivers the whole payload or fails.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Report<WriterError>>;

    /// Releases any connection; the next write starts from scratch.
    fn close(&mut self) -> Result<(), Report<WriterError>>;
}

/// The writers a configuration can select.
#[derive(Debug)]
pub enum Writer {
    Http(HttpWriter),
    Tcp(TcpWriter),
}

impl InfluxDbWriter for Writer {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Report<WriterError>> {
        match self {
            Writer::Http(writer) => writer.write_bytes(bytes),
            Writer::Tcp(writer) => writer.write_bytes(bytes),
        }
    }

    fn close(&mut self) -> Result<(), Report<WriterError>> {
        match self {
            Writer::Http(writer) => writer.close(),
            Writer::Tcp(writer) => writer.close(),
        }
    }
}

impl From<HttpWriter> for Writer {
    fn from(writer: HttpWriter) -> Self {
        Writer::Http(writer)
    }
}

impl From<TcpWriter> for Writer {
    fn from(writer: TcpWriter) -> Self {
        Writer::Tcp(writer)
    }
}
