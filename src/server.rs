//! JSON-lines TCP front end for [`VnaService`].
//!
//! Clients send one request object per line, e.g.
//! `{"service":"vna_freq_sweep_setup","freq_start":2000000,"freq_stop":6000000000,"freq_points":551}`,
//! and receive one response object per line.

use crate::error::VnaError;
use crate::service::{ServiceRequest, ServiceResponse, VnaService};
use crate::transport::Connector;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decode one request line and run it against the service.
pub fn handle_line<C: Connector>(service: &VnaService<C>, line: &str) -> ServiceResponse {
    match serde_json::from_str::<ServiceRequest>(line) {
        Ok(request) => {
            debug!("Request: {request:?}");
            service.handle(request)
        }
        Err(e) => ServiceResponse::Error {
            message: format!("Malformed request: {e}"),
        },
    }
}

pub struct ServiceServer<C: Connector> {
    service: Arc<VnaService<C>>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

impl<C: Connector + 'static> ServiceServer<C> {
    pub fn bind(address: &str, service: Arc<VnaService<C>>) -> Result<Self, VnaError> {
        let listener = TcpListener::bind(address).map_err(|source| VnaError::Io {
            source,
            context: format!("Binding service server to {address}"),
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| VnaError::Io {
                source,
                context: "Setting listener non-blocking".to_string(),
            })?;

        Ok(Self {
            service,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, VnaError> {
        self.listener.local_addr().map_err(|source| VnaError::Io {
            source,
            context: "Reading listener address".to_string(),
        })
    }

    /// Setting the flag stops [`run`](Self::run) and all client threads.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Share an externally owned flag, e.g. one raised by a Ctrl+C handler
    pub fn set_shutdown_flag(&mut self, flag: Arc<AtomicBool>) {
        self.shutdown = flag;
    }

    /// Accept clients until shutdown, then wait for their threads to end.
    pub fn run(&self) -> Result<(), VnaError> {
        info!("Service server listening on {}", self.local_addr()?);
        let mut clients: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("Client connected: {peer}");
                    let service = Arc::clone(&self.service);
                    let shutdown = Arc::clone(&self.shutdown);
                    clients.push(thread::spawn(move || {
                        if let Err(e) = serve_client(&service, stream, &shutdown) {
                            warn!("Client {peer} dropped: {e}");
                        }
                        info!("Client disconnected: {peer}");
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(VnaError::Io {
                        source,
                        context: "Accepting client".to_string(),
                    });
                }
            }
            clients.retain(|client| !client.is_finished());
        }

        for client in clients {
            let _ = client.join();
        }
        info!("Service server stopped");
        Ok(())
    }
}

fn serve_client<C: Connector>(
    service: &VnaService<C>,
    stream: TcpStream,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL * 4))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !shutdown.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let request = line.trim();
                if !request.is_empty() {
                    let response = handle_line(service, request);
                    let encoded = serde_json::to_string(&response)?;
                    writer.write_all(encoded.as_bytes())?;
                    writer.write_all(b"\n")?;
                    writer.flush()?;
                }
                line.clear();
            }
            // partial input stays in `line` until its newline arrives
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
