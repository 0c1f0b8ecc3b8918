//! HTTP over the relay session.
//!
//! A request is a Pnv envelope around two `<param>` directives: a media
//! selector and the target URL with a Basic credential. The reply is not
//! Pnv framed; it is a 12-byte binary preamble announcing the length of a
//! raw, unencrypted HTTP response.

use crate::constants::{
    ADMIN_USER, ASSET_CACHE_HEADER, AUTH_OK_STATUSES, TUNNEL_MEDIA_CODE, TUNNEL_MEDIA_VALUE,
    TUNNEL_PREAMBLE_SIZE, TUNNEL_URL_CODE,
};
use crate::envelope::{parse_tunnel_preamble, split_http};
use crate::error::Error;
use crate::relay::RelaySession;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tracing::{debug, trace};

const HEAD_END: &str = "\r\n\r\n";

/// A response fetched from the device's embedded web server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Second token of the status line, e.g. `200`
    pub status: String,
    /// Status line and headers, including the terminating blank line
    pub head: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse a raw HTTP response as returned through the tunnel.
    pub fn parse(raw: Bytes) -> Result<Self, Error> {
        let (head, _) = split_http(&raw).ok_or_else(|| {
            Error::Protocol(format!("No header terminator in {}b tunnel response", raw.len()))
        })?;
        let body = raw.slice(head.len()..);
        let head = String::from_utf8_lossy(head).into_owned();
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .ok_or_else(|| Error::Protocol("Tunnel response has no status line".to_string()))?
            .to_string();
        let content_type = header_value(&head, "Content-Type").map(str::to_string);
        Ok(Self {
            status,
            head,
            content_type,
            body,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == "200"
    }

    /// Body as text, for error reporting.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Status line, headers and body, ready to be written to a browser.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.head.len() + self.body.len());
        out.extend_from_slice(self.head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Value of the first header named `name` (case-insensitive).
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// `base64("admin:<password>")`.
pub fn basic_auth_token(password: &str) -> String {
    STANDARD.encode(format!("{ADMIN_USER}:{password}"))
}

/// Plaintext tunnel directive for one URL.
pub fn directive(url: &str, password: &str) -> String {
    format!(
        "<param><code value=\"{TUNNEL_MEDIA_CODE}\" /><media value=\"{TUNNEL_MEDIA_VALUE}\" /></param>\
         <param><code value=\"{TUNNEL_URL_CODE}\" /><url value=\"{url}\" /><auth value=\"{}\" /></param>",
        basic_auth_token(password)
    )
}

/// Fail with [`Error::AuthenticationFailure`] unless the status means the
/// credentials were accepted.
pub fn check_access(response: &HttpResponse) -> Result<(), Error> {
    if AUTH_OK_STATUSES.contains(&response.status.as_str()) {
        Ok(())
    } else {
        Err(Error::AuthenticationFailure {
            status: response.status.clone(),
        })
    }
}

/// Whether a path names a script or style asset.
pub fn is_static_asset(path: &str) -> bool {
    path.contains(".js") || path.contains(".css")
}

/// Add a long-lived cache header in front of the blank line ending `head`.
pub fn inject_cache_control(head: &str) -> String {
    head.replacen(HEAD_END, &format!("\r\n{ASSET_CACHE_HEADER}{HEAD_END}"), 1)
}

impl RelaySession {
    /// Fetch `url` from the device's web server through the relay.
    pub async fn fetch_http(&mut self, url: &str, password: &str) -> Result<HttpResponse, Error> {
        debug!("Tunnel request for {}", url);
        self.send_pnv(&directive(url, password)).await?;

        let stream = self.stream_mut();
        let preamble = stream.read_exact(TUNNEL_PREAMBLE_SIZE).await?;
        let length = parse_tunnel_preamble(&preamble)?;
        trace!("Tunnel response is {}b", length);
        let raw = stream.read_exact(length).await?;

        let response = HttpResponse::parse(raw)?;
        trace!(target: "edicloud::wire::text", "<< {}", response.head.trim_end());
        debug!(
            "Tunnel response for {}: HTTP {} ({}b, {})",
            url,
            response.status,
            response.body.len(),
            response.content_type.as_deref().unwrap_or("no content type")
        );
        Ok(response)
    }
}
