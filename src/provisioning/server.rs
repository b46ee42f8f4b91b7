//! HTTP front end of the provisioning endpoint.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via std::net). The
//! server is polled from the device loop instead of running on its own
//! thread, so a handler never races the relay for the store.

use super::{config_from_form, render_form, render_status, Provisioner, RestartRequest};
use crate::relay::RelayStats;
use crate::store::ConfigStore;
use log::{debug, info, warn};
use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use tiny_http::{Header, Method, Request, Response, Server};

/// Largest accepted form body.
const MAX_FORM_BODY: u64 = 1024;

/// Requests handled per poll, so a busy browser cannot starve the relay.
const MAX_REQUESTS_PER_POLL: usize = 4;

/// Non-blocking provisioning HTTP server.
pub struct ProvisioningServer {
    server: Server,
    local_addr: SocketAddr,
    html: Header,
    allow_post: Header,
}

impl ProvisioningServer {
    /// Bind the server.
    pub fn bind(addr: SocketAddr) -> Result<Self, ProvisioningError> {
        let server = Server::http(addr).map_err(|e| ProvisioningError::Bind(e.to_string()))?;
        let local_addr = server.server_addr().to_ip().unwrap_or(addr);

        // Pre-create headers to avoid repeated allocations
        let html = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
            .expect("static header");
        let allow_post = Header::from_bytes(&b"Allow"[..], &b"POST"[..]).expect("static header");

        info!("Provisioning page on http://{}/", local_addr);

        Ok(Self {
            server,
            local_addr,
            html,
            allow_post,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle the requests that are already waiting, without blocking.
    ///
    /// Returns a restart request when a save or reset succeeded.
    pub fn poll<St: ConfigStore>(
        &self,
        provisioner: &mut Provisioner<'_, St>,
        stats: &RelayStats,
    ) -> Option<RestartRequest> {
        for _ in 0..MAX_REQUESTS_PER_POLL {
            let request = match self.server.try_recv() {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    warn!("Provisioning server error: {}", e);
                    break;
                }
            };

            if let Some(restart) = self.handle(request, provisioner, stats) {
                return Some(restart);
            }
        }
        None
    }

    fn handle<St: ConfigStore>(
        &self,
        mut request: Request,
        provisioner: &mut Provisioner<'_, St>,
        stats: &RelayStats,
    ) -> Option<RestartRequest> {
        let path = request.url().split('?').next().unwrap_or("").to_string();
        let method = request.method().clone();
        debug!("{} {}", method, path);

        match (path.as_str(), &method) {
            ("/", Method::Get) => {
                let page = render_form(&provisioner.current_config());
                self.respond(request, Response::from_string(page).with_header(self.html.clone()));
                None
            }
            ("/status", Method::Get) => {
                let page = render_status(provisioner.status(), provisioner.relay_port(), stats);
                self.respond(request, Response::from_string(page).with_header(self.html.clone()));
                None
            }
            ("/save", Method::Post) => {
                let body = match read_body(&mut request) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Failed to read form: {}", e);
                        self.respond(request, text("Bad Request", 400));
                        return None;
                    }
                };

                let config = match config_from_form(&body, self.local_addr.port()) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Rejected configuration: {}", e);
                        self.respond(request, text(format!("Invalid configuration: {}", e), 400));
                        return None;
                    }
                };

                match provisioner.apply_and_restart(&config) {
                    Ok(restart) => {
                        self.respond(request, text("Saved. Rebooting...", 200));
                        Some(restart)
                    }
                    Err(e) => {
                        self.respond(request, text(format!("Save failed: {}", e), 500));
                        None
                    }
                }
            }
            ("/reset", Method::Post) => match provisioner.factory_reset_and_restart() {
                Ok(restart) => {
                    self.respond(request, text("Factory reset. Rebooting...", 200));
                    Some(restart)
                }
                Err(e) => {
                    self.respond(request, text(format!("Reset failed: {}", e), 500));
                    None
                }
            },
            ("/save", _) | ("/reset", _) => {
                let response = text("Method Not Allowed", 405).with_header(self.allow_post.clone());
                self.respond(request, response);
                None
            }
            _ => {
                self.respond(request, text("Not Found", 404));
                None
            }
        }
    }

    fn respond<R: Read>(&self, request: Request, response: Response<R>) {
        if let Err(e) = request.respond(response) {
            warn!("Failed to send response: {}", e);
        }
    }
}

fn text(body: impl Into<String>, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body).with_status_code(status)
}

fn read_body(request: &mut Request) -> std::io::Result<String> {
    let mut body = String::new();
    request
        .as_reader()
        .take(MAX_FORM_BODY)
        .read_to_string(&mut body)?;
    Ok(body)
}

/// Provisioning server failures.
#[derive(Debug)]
pub enum ProvisioningError {
    /// Could not open the HTTP listener.
    Bind(String),
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "failed to bind provisioning server: {}", e),
        }
    }
}

impl std::error::Error for ProvisioningError {}
