//! A blocking HTTP transport (§6 "Transport callback") for interactive CLI
//! use. The transport implementation is explicitly out of scope for the
//! core engine (spec.md §1); this is the thin, swappable default a host
//! binary wires in, not part of `in3-context`/`in3-client`.

use std::time::Duration;

use in3_context::{RawResponse, Transport, TransportRequest};
use in3_types::Result;

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .expect("building the blocking HTTP client with a fixed timeout cannot fail"),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Transport for HttpTransport {
    /// POSTs the same JSON-RPC payload to every chosen node URL, filling
    /// each slot's `result` on a 2xx response body or `error` otherwise —
    /// never both, and always exactly one, per §6.
    fn send(&self, request: &TransportRequest) -> Result<Vec<RawResponse>> {
        let mut out = Vec::with_capacity(request.urls.len());
        for url in &request.urls {
            let slot = match self
                .client
                .post(url)
                .header("content-type", "application/json")
                .body(request.payload.clone())
                .send()
            {
                Ok(resp) => match resp.text() {
                    Ok(body) => RawResponse { result: body, error: String::new() },
                    Err(e) => RawResponse { result: String::new(), error: e.to_string() },
                },
                Err(e) => RawResponse { result: String::new(), error: e.to_string() },
            };
            out.push(slot);
        }
        Ok(out)
    }
}
