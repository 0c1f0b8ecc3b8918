//! Device client: discovery, relay session ownership and reconnection.

use crate::config::ClientConfig;
use crate::descriptor::{DeviceDescriptor, ProbeStatus};
use crate::discovery::DiscoveryClient;
use crate::error::Error;
use crate::relay::RelaySession;
use crate::tunnel::HttpResponse;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One operation carried over the relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRequest {
    /// A Pnv-wrapped device command
    Command(String),
    /// A URL fetched through the HTTP tunnel
    Http(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayReply {
    Text(String),
    Http(HttpResponse),
}

impl RelayRequest {
    fn name(&self) -> &'static str {
        match self {
            RelayRequest::Command(_) => "relay command",
            RelayRequest::Http(_) => "tunnel request",
        }
    }

    async fn run(&self, session: &mut RelaySession, password: &str) -> Result<RelayReply, Error> {
        match self {
            RelayRequest::Command(command) => session.send_command(command).await.map(RelayReply::Text),
            RelayRequest::Http(url) => session.fetch_http(url, password).await.map(RelayReply::Http),
        }
    }
}

/// Talks to one device through the cloud.
///
/// Owns at most one [`RelaySession`]. On a transport failure the session is
/// dropped, discovery runs again (relay assignments are not durable) and a
/// new session replaces the old one before the operation is retried.
pub struct DeviceClient {
    discovery: DiscoveryClient,
    device_id: String,
    password: String,
    config: ClientConfig,
    descriptor: DeviceDescriptor,
    session: Option<RelaySession>,
}

impl DeviceClient {
    pub fn new(discovery: DiscoveryClient, device_id: &str, password: &str, config: ClientConfig) -> Self {
        Self {
            discovery,
            device_id: device_id.to_string(),
            password: password.to_string(),
            config,
            descriptor: DeviceDescriptor::failed(device_id, "not probed yet"),
            session: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Result of the most recent discovery probe.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Probe the device. Probe failures become a failed descriptor.
    pub async fn discover(&mut self) -> &DeviceDescriptor {
        self.descriptor = match self.discovery.probe(&self.device_id, &self.password).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("UDP communication error: {}", e);
                DeviceDescriptor::failed(&self.device_id, e.to_string())
            }
        };
        &self.descriptor
    }

    /// Open the relay session for the last discovered descriptor.
    pub async fn open(&mut self) -> Result<(), Error> {
        match &self.descriptor.status {
            Some(ProbeStatus::Offline) => return Err(Error::DeviceOffline),
            _ if !self.descriptor.is_reachable() => {
                return Err(Error::DeviceUnreachable {
                    status: self.descriptor.status_description(),
                });
            }
            _ => {}
        }
        sleep(self.config.settle_delay).await;
        let (relay_ip, relay_port, relay_id) = self.descriptor.relay_endpoint().unwrap_or_default();
        info!(
            "Querying device {} through TCP {}:{}, relayId={}",
            self.device_id, relay_ip, relay_port, relay_id
        );
        self.session = Some(RelaySession::connect(self.descriptor.clone(), &self.config).await?);
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), Error> {
        self.session = None;
        sleep(self.config.retry_interval).await;
        self.descriptor = self.discovery.probe(&self.device_id, &self.password).await?;
        self.session = Some(RelaySession::connect(self.descriptor.clone(), &self.config).await?);
        info!("Reconnected to device {}", self.device_id);
        Ok(())
    }

    /// Run one relay operation, reconnecting on transport failures.
    ///
    /// Every reconnection attempt counts against `tcp_max_retries`, whether
    /// it failed or the operation failed again afterwards. Past the bound
    /// the error is [`Error::RetriesExhausted`]. Non-transport errors are
    /// returned as they are.
    pub async fn execute(&mut self, request: &RelayRequest) -> Result<RelayReply, Error> {
        let mut attempts = 0u32;
        loop {
            let outcome = match self.session.as_mut() {
                Some(session) => request.run(session, &self.password).await,
                None => Err(Error::ConnectionBroken),
            };
            let err = match outcome {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if attempts >= self.config.tcp_max_retries {
                warn!(
                    "TCP connection to cloud broken. {} reconnect attempts failed",
                    attempts
                );
                return Err(Error::RetriesExhausted {
                    operation: request.name(),
                    attempts,
                });
            }
            attempts += 1;
            debug!("Relay communication error: {}. Reconnecting... (attempt {})", err, attempts);
            if let Err(e) = self.reconnect().await {
                debug!("Error reconnecting: {}", e);
            }
        }
    }

    /// Send a device command and return the decrypted reply.
    pub async fn send_command(&mut self, command: &str) -> Result<String, Error> {
        match self.execute(&RelayRequest::Command(command.to_string())).await? {
            RelayReply::Text(text) => Ok(text),
            RelayReply::Http(_) => Err(Error::Protocol("tunnel reply to a device command".to_string())),
        }
    }

    /// Fetch a URL from the device's web server.
    pub async fn fetch_http(&mut self, url: &str) -> Result<HttpResponse, Error> {
        match self.execute(&RelayRequest::Http(url.to_string())).await? {
            RelayReply::Http(response) => Ok(response),
            RelayReply::Text(_) => Err(Error::Protocol("command reply to a tunnel request".to_string())),
        }
    }

    /// Check the device accepts the credentials over HTTP.
    pub async fn authenticate_http(&mut self) -> Result<HttpResponse, Error> {
        debug!("Testing access");
        let response = self.fetch_http("/").await?;
        crate::tunnel::check_access(&response)?;
        self.descriptor.password = Some(self.password.clone());
        debug!("Access to {} granted", self.device_id);
        Ok(response)
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}
