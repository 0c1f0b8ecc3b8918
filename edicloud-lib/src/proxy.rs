//! Local HTTP listener forwarding browser requests through the tunnel.
//!
//! Each accepted connection gets its own task that parses the request and
//! hands the URL to a single worker owning the [`DeviceClient`]. The relay
//! carries no request ids, so the worker runs tunnel requests strictly one
//! at a time in arrival order.

use crate::client::DeviceClient;
use crate::constants::{DOUBLE_CRLF, LEGACY_SNAPSHOT_PATH, MAX_PROXY_REQUEST_SIZE, SNAPSHOT_PATH};
use crate::error::Error;
use crate::framing::FramedStream;
use crate::tunnel::{HttpResponse, header_value, inject_cache_control, is_static_asset};
use std::io;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

const JOB_QUEUE_DEPTH: usize = 32;

type Job = (String, oneshot::Sender<Result<HttpResponse, Error>>);

/// Method and target of an HTTP request head.
pub fn parse_request_line(head: &str) -> Result<(String, String), Error> {
    let line = head.lines().next().unwrap_or_default();
    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some(method), Some(target)) if !method.is_empty() && !target.is_empty() => {
            Ok((method.to_string(), target.to_string()))
        }
        _ => Err(Error::Protocol(format!("Malformed request line: {:?}", line))),
    }
}

/// Append a form body to the target as a query string.
pub fn flatten_post(target: &str, body: &[u8]) -> String {
    format!("{}?{}", target, String::from_utf8_lossy(body))
}

/// Map legacy aliases onto the paths the device actually serves.
pub fn rewrite_path(target: String) -> String {
    if target == LEGACY_SNAPSHOT_PATH {
        SNAPSHOT_PATH.to_string()
    } else {
        target
    }
}

/// Serve browser requests until the worker hits a fatal error.
///
/// Failures of a single connection are logged and never stop the listener.
pub async fn serve(listener: TcpListener, client: DeviceClient) -> Result<(), Error> {
    let read_timeout = client.config().tcp_timeout;
    let (jobs, queue) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
    let mut worker = tokio::spawn(run_worker(client, queue));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("New web connection accepted from {}", peer);
                    let jobs = jobs.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, jobs, read_timeout).await {
                            error!("Error on web request: {}", e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept web connection: {}", e),
            },
            finished = &mut worker => {
                return finished.map_err(|e| Error::Io(io::Error::other(e)))?;
            }
        }
    }
}

/// Run queued tunnel requests one by one. Returns on the first fatal error.
async fn run_worker(mut client: DeviceClient, mut queue: mpsc::Receiver<Job>) -> Result<(), Error> {
    while let Some((url, reply)) = queue.recv().await {
        match client.fetch_http(&url).await {
            Err(e) if e.is_fatal() => {
                let _ = client.close().await;
                return Err(e);
            }
            outcome => {
                // The browser may have gone away already
                let _ = reply.send(outcome);
            }
        }
    }
    Ok(())
}

async fn handle_connection(stream: TcpStream, jobs: mpsc::Sender<Job>, read_timeout: Duration) -> Result<(), Error> {
    let mut stream = FramedStream::new(stream, read_timeout).with_max_len(MAX_PROXY_REQUEST_SIZE);
    let head = stream.read_until(DOUBLE_CRLF).await?;
    let head = String::from_utf8_lossy(&head).into_owned();
    let (method, mut url) = parse_request_line(&head)?;
    if method == "POST" {
        let length = header_value(&head, "Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| Error::Protocol("POST request without a valid Content-Length".to_string()))?;
        if head.len().saturating_add(length) > MAX_PROXY_REQUEST_SIZE {
            return Err(Error::Protocol(format!("POST body of {}b is too large", length)));
        }
        let body = stream.read_exact(length).await?;
        url = flatten_post(&url, &body);
    }

    info!("Requesting {} from device", url);
    let url = rewrite_path(url);
    let (reply, response) = oneshot::channel();
    jobs.send((url.clone(), reply))
        .await
        .map_err(|_| Error::ConnectionBroken)?;
    let response = response.await.map_err(|_| Error::ConnectionBroken)??;

    let head = if is_static_asset(&url) {
        inject_cache_control(&response.head)
    } else {
        response.head.clone()
    };
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.shutdown().await
}
