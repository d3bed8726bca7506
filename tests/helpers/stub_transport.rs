//! Scripted in-memory transport.
//!
//! Records every option per transfer and replays a canned response into
//! the sinks on `perform`.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use veneer::transport::{Sink, TransferInfo, Transport, TransportOption};
use veneer::TransportError;

#[derive(Debug, Default)]
pub struct StubLog {
    /// Options of each transfer, one entry per `reset`.
    pub transfers: Vec<Vec<TransportOption>>,
    pub performs: usize,
    pub closes: usize,
}

/// Shared view of a stub's log that outlives the session owning the stub.
#[derive(Debug, Clone, Default)]
pub struct StubHandle(Arc<Mutex<StubLog>>);

impl StubHandle {
    fn log(&self) -> MutexGuard<'_, StubLog> {
        self.0.lock().unwrap()
    }

    pub fn transfers(&self) -> usize {
        self.log().transfers.len()
    }

    pub fn last_options(&self) -> Vec<TransportOption> {
        self.log().transfers.last().cloned().unwrap_or_default()
    }

    pub fn options_of(&self, transfer: usize) -> Vec<TransportOption> {
        self.log().transfers[transfer].clone()
    }

    pub fn performs(&self) -> usize {
        self.log().performs
    }

    pub fn closes(&self) -> usize {
        self.log().closes
    }

    /// Header lines handed to the transport in the last transfer.
    pub fn last_header_lines(&self) -> Vec<String> {
        self.last_options()
            .into_iter()
            .find_map(|o| match o {
                TransportOption::HttpHeader(lines) => Some(lines),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct StubTransport {
    handle: StubHandle,
    status: u16,
    body: Vec<u8>,
    raw_headers: Vec<u8>,
    effective_url: Option<String>,
    redirect_count: u32,
    redirect_url: String,
    fail_with: Option<TransportError>,
    url: String,
    write_sink: Option<Sink>,
    header_sink: Option<Sink>,
}

impl StubTransport {
    /// Replays `200 OK` with body `ok`.
    pub fn new() -> Self {
        Self {
            handle: StubHandle::default(),
            status: 200,
            body: b"ok".to_vec(),
            raw_headers: b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n".to_vec(),
            effective_url: None,
            redirect_count: 0,
            redirect_url: String::new(),
            fail_with: None,
            url: String::new(),
            write_sink: None,
            header_sink: None,
        }
    }

    pub fn handle(&self) -> StubHandle {
        self.handle.clone()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn with_raw_headers(mut self, raw: &[u8]) -> Self {
        self.raw_headers = raw.to_vec();
        self
    }

    pub fn with_effective_url(mut self, url: &str) -> Self {
        self.effective_url = Some(url.to_string());
        self
    }

    pub fn with_redirects(mut self, count: u32, redirect_url: &str) -> Self {
        self.redirect_count = count;
        self.redirect_url = redirect_url.to_string();
        self
    }

    pub fn failing(mut self, err: TransportError) -> Self {
        self.fail_with = Some(err);
        self
    }
}

impl Transport for StubTransport {
    fn reset(&mut self) {
        self.url.clear();
        self.write_sink = None;
        self.header_sink = None;
        self.handle.log().transfers.push(Vec::new());
    }

    fn set_option(&mut self, option: TransportOption) -> Result<(), TransportError> {
        match &option {
            TransportOption::Url(url) => self.url = url.clone(),
            TransportOption::WriteSink(sink) => self.write_sink = Some(sink.clone()),
            TransportOption::HeaderSink(sink) => self.header_sink = Some(sink.clone()),
            _ => {}
        }
        let mut log = self.handle.log();
        match log.transfers.last_mut() {
            Some(transfer) => transfer.push(option),
            None => log.transfers.push(vec![option]),
        }
        Ok(())
    }

    fn perform(&mut self) -> Result<(), TransportError> {
        self.handle.log().performs += 1;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        if let Some(sink) = &mut self.header_sink {
            sink.write_all(&self.raw_headers).unwrap();
        }
        if let Some(sink) = &mut self.write_sink {
            sink.write_all(&self.body).unwrap();
        }
        Ok(())
    }

    fn info(&self) -> TransferInfo {
        TransferInfo {
            effective_url: self.effective_url.clone().unwrap_or_else(|| self.url.clone()),
            response_code: self.status,
            total_time: Duration::from_millis(5),
            redirect_count: self.redirect_count,
            redirect_url: self.redirect_url.clone(),
        }
    }

    fn close(&mut self) {
        self.handle.log().closes += 1;
    }
}
