//! Writes payloads to a raw TCP line protocol listener.

use std::io::Write;
use std::net::Shutdown;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;

use super::InfluxDbWriter;
use super::WriterError;

/// Keeps one connection open across writes and reconnects after [`close`](InfluxDbWriter::close).
#[derive(Debug)]
pub struct TcpWriter {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpWriter {
    /// `timeout` bounds connecting as well as each read and write.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            stream: None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&self) -> Result<TcpStream, Report<WriterError>> {
        let endpoint = self.endpoint();
        let connect_error = || WriterError::Connect {
            endpoint: endpoint.clone(),
        };

        let mut last_error = None;
        for address in (self.host.as_str(), self.port)
            .to_socket_addrs()
            .change_context_lazy(connect_error)?
        {
            match TcpStream::connect_timeout(&address, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .change_context_lazy(connect_error)?;
                    stream
                        .set_write_timeout(Some(self.timeout))
                        .change_context_lazy(connect_error)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => Report::new(e).change_context(connect_error()),
            None => Report::new(connect_error()).attach_printable("host resolved to no address"),
        })
    }
}

impl InfluxDbWriter for TcpWriter {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Report<WriterError>> {
        if self.stream.is_none() {
            self.stream = Some(self.connect()?);
        }
        let endpoint = self.endpoint();
        let Some(stream) = self.stream.as_mut() else {
            return Err(Report::new(WriterError::Connect { endpoint }));
        };

        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .change_context(WriterError::Write { endpoint })
    }

    fn close(&mut self) -> Result<(), Report<WriterError>> {
        match self.stream.take() {
            Some(stream) => stream
                .shutdown(Shutdown::Both)
                .change_context(WriterError::Close),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    use similar_asserts::assert_eq;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn connects_lazily_and_writes_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).unwrap();
            received
        });

        let mut writer = TcpWriter::new("127.0.0.1", port, TIMEOUT);
        assert!(!writer.is_connected());

        writer.write_bytes(b"m value=1i 1000000\n").unwrap();
        writer.write_bytes(b"m value=2i 2000000\n").unwrap();
        assert!(writer.is_connected());

        writer.close().unwrap();
        assert!(!writer.is_connected());

        assert_eq!(
            server.join().unwrap(),
            "m value=1i 1000000\nm value=2i 2000000\n"
        );
    }

    #[test]
    fn reconnects_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            (0..2)
                .map(|_| {
                    let (mut socket, _) = listener.accept().unwrap();
                    let mut received = String::new();
                    socket.read_to_string(&mut received).unwrap();
                    received
                })
                .collect::<Vec<_>>()
        });

        let mut writer = TcpWriter::new("127.0.0.1", port, TIMEOUT);
        writer.write_bytes(b"first\n").unwrap();
        writer.close().unwrap();
        writer.write_bytes(b"second\n").unwrap();
        writer.close().unwrap();

        assert_eq!(server.join().unwrap(), vec!["first\n", "second\n"]);
    }

    #[test]
    fn refused_connection_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut writer = TcpWriter::new("127.0.0.1", port, TIMEOUT);
        let err = writer.write_bytes(b"m value=1i 0\n").unwrap_err();

        assert!(matches!(err.current_context(), WriterError::Connect { .. }));
        assert!(!writer.is_connected());
    }

    #[test]
    fn close_without_connection_is_noop() {
        let mut writer = TcpWriter::new("127.0.0.1", 8094, TIMEOUT);
        assert!(writer.close().is_ok());
    }
}
