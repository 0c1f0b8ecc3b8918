//! Common test utilities: loopback stand-ins for the cloud services

// Allow unused items since this is a shared module
// used across multiple test files - not all items are used in every test file
#![allow(dead_code)]

#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use edicloud_lib::cipher::{decrypt, encrypt_text};
#[allow(unused_imports)]
pub use edicloud_lib::error::Error;
#[allow(unused_imports)]
pub use edicloud_lib::{ClientConfig, DeviceClient, DiscoveryClient};

use edicloud_lib::constants::DOUBLE_CRLF;
use edicloud_lib::envelope::{handshake_message, parse_pnv_header};
use edicloud_lib::framing::FramedStream;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub const DEVICE_ID: &str = "AABBCC112233";
pub const PASSWORD: &str = "1234";
pub const RELAY_ID: &str = "XYZ";

/// Send library logs to the test harness output. Run with
/// `RUST_LOG=edicloud::wire=trace` to see the traffic of the fakes.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Configuration with short timers so failure paths finish quickly.
pub fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_udp_timeout(Duration::from_millis(200))
        .with_tcp_timeout(Duration::from_secs(2))
        .with_retry_interval(Duration::from_millis(10))
        .with_settle_delay(Duration::ZERO)
}

/// Discovery reply assigning the relay at `relay`.
pub fn online_reply(relay: SocketAddr) -> String {
    format!(
        "<param><code value=\"1020\" /><id value=\"{DEVICE_ID}\" /><ip value=\"192.168.0.20\" />\
         <relayip value=\"{}\" /><relayreqport value=\"{}\" /><relayid value=\"{RELAY_ID}\" />\
         <alias value=\"Lamp\" /><model value=\"SP2101W\" /><type value=\"plug\" /><prodid value=\"7\" /></param>",
        relay.ip(),
        relay.port()
    )
}

/// A UDP responder standing in for the cloud discovery endpoint.
pub struct FakeDiscovery {
    pub addr: SocketAddr,
    /// Datagrams received so far
    pub hits: Arc<AtomicUsize>,
    /// Decrypted requests, in arrival order
    pub requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeDiscovery {
    /// Answer every request with `reply`, or stay silent when `None`.
    pub async fn spawn(reply: Option<String>) -> Self {
        init_tracing();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (task_hits, task_requests) = (hits.clone(), requests.clone());
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                task_hits.fetch_add(1, Ordering::SeqCst);
                task_requests.lock().unwrap().push(decrypt(&buf[..n]).text());
                if let Some(reply) = &reply {
                    let _ = socket.send_to(&encrypt_text(reply), peer).await;
                }
            }
        });
        Self {
            addr,
            hits,
            requests,
            task,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn client(&self, config: ClientConfig) -> DeviceClient {
        DeviceClient::new(DiscoveryClient::new(self.addr, config.clone()), DEVICE_ID, PASSWORD, config)
    }
}

impl Drop for FakeDiscovery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What the fake relay sends back for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Pnv-framed, encrypted text
    Pnv(String),
    /// Tunnel preamble followed by a raw HTTP response
    Tunnel(Vec<u8>),
    /// Drop the connection without answering
    Close,
}

/// Raw HTTP response bytes.
pub fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Smart plug reply as the devices send it. Encrypted replies always start with `<`.
pub fn plug_reply(cmd: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF8\"?><SMARTPLUG id=\"edimax\"><CMD id=\"{cmd}\">{body}</CMD></SMARTPLUG>"
    )
}

/// A TCP relay that serves one scripted list of replies per connection.
pub struct FakeRelay {
    pub addr: SocketAddr,
    /// Raw handshake bytes, one entry per connection
    pub handshakes: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Decrypted Pnv requests across all connections
    pub requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeRelay {
    pub async fn spawn(script: Vec<Vec<Reply>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (task_handshakes, task_requests) = (handshakes.clone(), requests.clone());
        let handshake_len = handshake_message(DEVICE_ID, RELAY_ID).len();

        let task = tokio::spawn(async move {
            for replies in script {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let mut stream = FramedStream::new(socket, Duration::from_secs(5));
                let Ok(handshake) = stream.read_exact(handshake_len).await else {
                    continue;
                };
                task_handshakes.lock().unwrap().push(handshake.to_vec());

                for reply in replies {
                    let Ok(request) = read_pnv(&mut stream).await else {
                        break;
                    };
                    task_requests.lock().unwrap().push(request);
                    let frame = match reply {
                        Reply::Pnv(text) => {
                            let mut frame = format!("PnvDataLen: {}\r\n\r\n", text.len()).into_bytes();
                            frame.extend_from_slice(&encrypt_text(&text));
                            frame
                        }
                        Reply::Tunnel(raw) => {
                            let mut frame = (raw.len() as u32).to_le_bytes().to_vec();
                            frame.extend_from_slice(&[0u8; 8]);
                            frame.extend_from_slice(&raw);
                            frame
                        }
                        Reply::Close => break,
                    };
                    if stream.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            handshakes,
            requests,
            task,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn handshakes(&self) -> Vec<Vec<u8>> {
        self.handshakes.lock().unwrap().clone()
    }
}

impl Drop for FakeRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_pnv(stream: &mut FramedStream<tokio::net::TcpStream>) -> Result<String, Error> {
    let header = stream.read_until(DOUBLE_CRLF).await?;
    let length = parse_pnv_header(&header)?;
    let body = stream.read_exact(length).await?;
    Ok(decrypt(&body).text())
}

/// Discovery and relay wired together for a reachable device.
pub async fn online_device(script: Vec<Vec<Reply>>) -> (FakeDiscovery, FakeRelay) {
    let relay = FakeRelay::spawn(script).await;
    let discovery = FakeDiscovery::spawn(Some(online_reply(relay.addr))).await;
    (discovery, relay)
}
