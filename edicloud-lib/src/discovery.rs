//! UDP discovery against the cloud service.
//!
//! One probe sends an encrypted `<param>` request carrying the device id,
//! a credential hash and a sequence token, and waits for a single reply
//! describing the device's relay assignment. Socket failures (including a
//! reply that never arrives) are retried on a freshly bound socket.

use crate::cipher::{decrypt, encrypt_text};
use crate::config::ClientConfig;
use crate::constants::{
    ADMIN_USER, DISCOVERY_CODE, DUMMY_LAN_IP, DUMMY_LAN_PORT, NAT_TYPE, REQ_FW_VERSION, UDP_BUFFER_SIZE,
};
use crate::descriptor::DeviceDescriptor;
use crate::error::Error;
use crate::markup::Markup;
use md5::{Digest, Md5};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

/// MD5 of `admin:<password>`, lowercase hex.
pub fn auth_hash(password: &str) -> String {
    let digest = Md5::digest(format!("{ADMIN_USER}:{password}").as_bytes());
    hex::encode(digest)
}

/// Build the plaintext discovery request.
pub fn build_request(device_id: &str, password: &str, timestamp_ms: i64) -> String {
    format!(
        concat!(
            "<param><code value=\"{code}\" /><id value=\"{id}\" /><lanip value=\"{lanip}\" />",
            "<lanport value=\"{lanport}\" /><nattype value=\"{nattype}\" /><reqdirport value=\"0\" />",
            "<reqfwver value=\"{fwver}\" /><auth value=\"{auth}\" /><seq value=\"{id}{ts}\" /></param>"
        ),
        code = DISCOVERY_CODE,
        id = device_id,
        lanip = DUMMY_LAN_IP,
        lanport = DUMMY_LAN_PORT,
        nattype = NAT_TYPE,
        fwver = REQ_FW_VERSION,
        auth = auth_hash(password),
        ts = timestamp_ms,
    )
}

/// Parse a decrypted discovery reply.
pub fn parse_reply(device_id: &str, reply: &str, password: &str) -> Result<DeviceDescriptor, Error> {
    let doc = Markup::parse(reply)?;
    Ok(DeviceDescriptor::from_reply(device_id, &doc, password))
}

/// Client for the cloud discovery endpoint.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    endpoint: SocketAddr,
    config: ClientConfig,
}

impl DiscoveryClient {
    pub fn new(endpoint: SocketAddr, config: ClientConfig) -> Self {
        Self { endpoint, config }
    }

    /// Probe a device, retrying socket failures up to the configured bound.
    ///
    /// Returns [`Error::RetriesExhausted`] once `udp_max_retries` consecutive
    /// attempts failed. A reply that cannot be parsed is not retried.
    pub async fn probe(&self, device_id: &str, password: &str) -> Result<DeviceDescriptor, Error> {
        debug!("Probing device {} by UDP", device_id);
        let max_attempts = self.config.udp_max_retries.max(1);
        let mut attempt = 0;
        let reply = loop {
            match self.exchange(device_id, password).await {
                Ok(reply) => break reply,
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!("UDP connection to cloud broken. {} attempts failed.", attempt);
                        return Err(Error::RetriesExhausted {
                            operation: "UDP discovery",
                            attempts: attempt,
                        });
                    }
                    debug!(
                        "UDP connection to cloud broken: {}. Reconnecting... (attempt {})",
                        e, attempt
                    );
                    sleep(self.config.retry_interval).await;
                }
            }
        };

        let descriptor = parse_reply(device_id, &reply, password)?;
        debug!(
            "Received UDP response for device {}. Status is {}",
            device_id,
            descriptor.status.as_ref().map(|s| s.code()).unwrap_or("<none>")
        );
        if let Some((relay_ip, relay_port, relay_id)) = descriptor.relay_endpoint() {
            info!(
                device = device_id,
                ip = descriptor.device_ip.as_deref().unwrap_or_default(),
                alias = descriptor.alias.as_deref().unwrap_or_default(),
                model = descriptor.model.as_deref().unwrap_or_default(),
                relay = %format!("{relay_ip}:{relay_port}"),
                relay_id,
                "Device is online"
            );
        }
        Ok(descriptor)
    }

    /// One request/reply exchange on a freshly bound socket.
    async fn exchange(&self, device_id: &str, password: &str) -> Result<String, Error> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let request = build_request(device_id, password, timestamp);
        trace!(target: "edicloud::wire::text", ">> {}", request);
        let payload = encrypt_text(&request);
        debug!("Sending UDP request to {} for device {}", self.endpoint, device_id);
        trace!(target: "edicloud::wire::hex", bytes = hex::encode(&payload), ">>");
        socket.send_to(&payload, self.endpoint).await?;

        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        trace!("Waiting for UDP response");
        let (received, from) = timeout(self.config.udp_timeout, socket.recv_from(&mut buf)).await??;
        trace!("Got {}b in UDP response from {}", received, from);
        trace!(target: "edicloud::wire::hex", bytes = hex::encode(&buf[..received]), "<<");
        let reply = decrypt(&buf[..received]).text();
        trace!(target: "edicloud::wire::text", "<< {}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_hash() {
        let expected = hex::encode(Md5::digest(b"admin:1234"));
        assert_eq!(auth_hash("1234"), expected);
        assert_eq!(auth_hash("1234").len(), 32);
        assert_ne!(auth_hash("1234"), auth_hash("12345"));
        assert!(auth_hash("").chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_build_request_layout() {
        let request = build_request("AABBCC112233", "1234", 1_600_000_000_000);
        let expected = format!(
            "<param><code value=\"1030\" /><id value=\"AABBCC112233\" /><lanip value=\"192.168.1.2\" /><lanport value=\"36587\" /><nattype value=\"7\" /><reqdirport value=\"0\" /><reqfwver value=\"1.0#010000\" /><auth value=\"{}\" /><seq value=\"AABBCC1122331600000000000\" /></param>",
            auth_hash("1234")
        );
        assert_eq!(request, expected);
    }

    #[test]
    fn test_request_parses_as_markup() {
        let doc = Markup::parse(&build_request("AABBCC112233", "1234", 42)).unwrap();
        assert_eq!(doc.child_value("code"), Some("1030"));
        assert_eq!(doc.child_value("seq"), Some("AABBCC11223342"));
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        assert!(parse_reply("AABBCC112233", "<param", "1234").is_err());
    }
}
