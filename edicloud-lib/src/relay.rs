// TCP session through the cloud relay

use crate::cipher::{decrypt, encrypt_text};
use crate::config::ClientConfig;
use crate::constants::DOUBLE_CRLF;
use crate::descriptor::DeviceDescriptor;
use crate::envelope::{encode_pnv, handshake_message, parse_pnv_header};
use crate::error::Error;
use crate::framing::FramedStream;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// A live, joined connection to the relay assigned to one device.
///
/// The session owns the descriptor it was opened from, so the relay
/// address and the password always belong to the same discovery probe.
/// Reconnecting means building a new session, never patching this one.
pub struct RelaySession {
    stream: FramedStream<TcpStream>,
    descriptor: DeviceDescriptor,
}

impl RelaySession {
    /// Open a TCP connection to the descriptor's relay and join the device.
    ///
    /// The relay never acknowledges the join; the session is usable as soon
    /// as the handshake has been written.
    pub async fn connect(descriptor: DeviceDescriptor, config: &ClientConfig) -> Result<Self, Error> {
        let (relay_ip, relay_port, relay_id) =
            descriptor
                .relay_endpoint()
                .ok_or_else(|| Error::DeviceUnreachable {
                    status: descriptor
                        .status
                        .as_ref()
                        .map(|s| s.code().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                })?;

        debug!("Connecting to relay {}:{}", relay_ip, relay_port);
        let tcp = timeout(config.tcp_timeout, TcpStream::connect((relay_ip, relay_port))).await??;
        tcp.set_nodelay(true)?;
        let mut stream = FramedStream::new(tcp, config.tcp_timeout);

        let join = handshake_message(&descriptor.device_id, relay_id);
        trace!(target: "edicloud::wire::text", ">> {}", join.trim_end());
        stream.write_all(&encrypt_text(&join)).await?;
        info!("Joined device {} on relay {}:{}", descriptor.device_id, relay_ip, relay_port);

        Ok(Self { stream, descriptor })
    }

    /// The discovery result this session was opened from.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Send a Pnv-wrapped command without reading anything back.
    pub(crate) async fn send_pnv(&mut self, command: &str) -> Result<(), Error> {
        self.stream.write_all(&encode_pnv(command)).await
    }

    pub(crate) fn stream_mut(&mut self) -> &mut FramedStream<TcpStream> {
        &mut self.stream
    }

    /// Send a device command and return the decrypted reply.
    ///
    /// Transport failures and malformed reply headers come back as
    /// transient errors (see [`Error::is_transient`]) so the caller can
    /// reconnect.
    pub async fn send_command(&mut self, command: &str) -> Result<String, Error> {
        self.send_pnv(command).await?;

        let header = self.stream.read_until(DOUBLE_CRLF).await?;
        trace!(target: "edicloud::wire::text", "<< {}", String::from_utf8_lossy(&header).trim_end());
        let length = parse_pnv_header(&header)?;
        trace!("Reply body is {}b", length);

        let body = self.stream.read_exact(length).await?;
        let reply = decrypt(&body).text();
        trace!(target: "edicloud::wire::text", "<< {}", reply);
        Ok(reply)
    }

    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.shutdown().await
    }
}
