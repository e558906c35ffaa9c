//! Writes payloads to the InfluxDB HTTP `/write` endpoint.

use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use reqwest::blocking::Client as BlockingClient;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::InfluxDbWriter;
use super::WriterError;

const OCTET_STREAM: &str = "application/octet-stream";

/// POSTs each payload to `http://{host}:{port}/write?db={database}`.
///
/// The blocking client is created on the first write, so a writer can be
/// built from async code and used from a blocking thread.
#[derive(Debug)]
pub struct HttpWriter {
    endpoint: Url,
    connect_timeout: Duration,
    timeout: Duration,
    client: Option<BlockingClient>,
}

impl HttpWriter {
    /// # Errors
    ///
    /// - [`WriterError::Client`] if `host` and `port` do not form a valid URL
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, Report<WriterError>> {
        let mut endpoint = Url::parse(&format!("http://{host}:{port}/write"))
            .change_context(WriterError::Client)
            .attach_printable_lazy(|| format!("host: {host}, port: {port}"))?;
        endpoint.query_pairs_mut().append_pair("db", database);

        Ok(Self {
            endpoint,
            connect_timeout,
            timeout,
            client: None,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn client(&mut self) -> Result<&BlockingClient, Report<WriterError>> {
        if self.client.is_none() {
            let client = BlockingClient::builder()
                .connect_timeout(self.connect_timeout)
                .timeout(self.timeout)
                .build()
                .change_context(WriterError::Client)?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| Report::new(WriterError::Client))
    }
}

impl InfluxDbWriter for HttpWriter {
    /// Server errors and transport failures fail the write. A client error
    /// (4xx) means the batch itself was rejected; it is logged and dropped
    /// since resending it cannot succeed.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Report<WriterError>> {
        let endpoint = self.endpoint.to_string();
        let url = self.endpoint.clone();

        let response = self
            .client()?
            .post(url)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| {
                let context = if e.is_connect() {
                    WriterError::Connect {
                        endpoint: endpoint.clone(),
                    }
                } else {
                    WriterError::Write {
                        endpoint: endpoint.clone(),
                    }
                };
                Report::new(e).change_context(context)
            })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().unwrap_or_default();
            return Err(Report::new(WriterError::Status {
                endpoint,
                status: status.as_u16(),
            })
            .attach_printable(body));
        }
        if status.is_client_error() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(%endpoint, %status, %body, "InfluxDB rejected the batch, dropping it");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Report<WriterError>> {
        Ok(())
    }
}
