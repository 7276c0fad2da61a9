// HTTP pairing endpoint
// The HTTP server thread hands each request body to the control loop through
// a single-slot channel and waits for the loop's answer on a signal. Only one
// exchange can be in flight; a second client gets 503.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embedded_svc::http::Method;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request};
use log::{info, warn};

use crate::hal::PairingEndpoint;
use crate::provisioning::PairingResponse;

const MAX_REQUEST_BODY: usize = 1024;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

static PAIRING_REQUESTS: Channel<CriticalSectionRawMutex, serde_json::Value, 1> = Channel::new();
static PAIRING_RESPONSES: Signal<CriticalSectionRawMutex, PairingResponse> = Signal::new();

#[derive(Default)]
pub struct HttpPairingEndpoint {
    server: Option<EspHttpServer<'static>>,
}

impl HttpPairingEndpoint {
    pub fn new() -> Self {
        Self { server: None }
    }
}

fn read_request_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_REQUEST_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_json(
    req: Request<&mut EspHttpConnection<'_>>,
    status: u16,
    body: &[u8],
) -> Result<()> {
    req.into_response(
        status,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(body)?;
    Ok(())
}

/// Block the HTTP thread until the control loop answers
fn await_response() -> Option<PairingResponse> {
    let started = Instant::now();
    while started.elapsed() < RESPONSE_TIMEOUT {
        if let Some(response) = PAIRING_RESPONSES.try_take() {
            return Some(response);
        }
        thread::sleep(RESPONSE_POLL_INTERVAL);
    }
    None
}

fn handle_pair(mut req: Request<&mut EspHttpConnection<'_>>) -> Result<()> {
    let body = match read_request_body(&mut req) {
        Ok(body) => body,
        Err(e) => {
            warn!("⚠️ Pairing request body rejected: {:?}", e);
            return write_json(req, 413, br#"{"pairingResponse":-1,"pairingResponseDetail":"Request body too large"}"#);
        }
    };

    // Anything that is not JSON is handed on as Null and rejected by validation
    let request = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

    PAIRING_RESPONSES.reset();
    if PAIRING_REQUESTS.try_send(request).is_err() {
        return write_json(req, 503, br#"{"pairingResponse":-1,"pairingResponseDetail":"Busy"}"#);
    }

    match await_response() {
        Some(response) => {
            let body = serde_json::to_vec(&response)?;
            write_json(req, 200, &body)
        }
        None => {
            warn!("⚠️ Pairing request timed out waiting for the controller");
            write_json(req, 504, br#"{"pairingResponse":-1,"pairingResponseDetail":"Timeout"}"#)
        }
    }
}

impl PairingEndpoint for HttpPairingEndpoint {
    fn start(&mut self, path: &str) -> Result<()> {
        let conf = HttpConfiguration {
            stack_size: 10 * 1024,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf)?;
        server.fn_handler::<anyhow::Error, _>(path, Method::Post, handle_pair)?;
        self.server = Some(server);
        info!("🌐 Pairing endpoint listening on POST {}", path);
        Ok(())
    }

    fn next_request(&mut self) -> Option<serde_json::Value> {
        PAIRING_REQUESTS.try_receive().ok()
    }

    fn respond(&mut self, response: &PairingResponse) -> Result<()> {
        PAIRING_RESPONSES.signal(response.clone());
        Ok(())
    }
}
