//! Message envelopes used on the relay connection.
//!
//! Outgoing commands use the Pnv envelope: an ASCII length header followed
//! by the encrypted command. Device command replies come back in the same
//! envelope. Tunnelled HTTP replies instead carry a 12-byte binary preamble
//! whose first four bytes give the length of the raw HTTP response.

use crate::cipher::{Rotation, encrypt};
use crate::constants::{DOUBLE_CRLF, TUNNEL_PREAMBLE_SIZE};
use crate::error::Error;
use bytes::Buf;
use tracing::trace;

const PNV_HEADER_NAME: &str = "PnvDataLen";

/// Build the relay handshake line for a device.
pub fn handshake_message(device_id: &str, relay_id: &str) -> String {
    format!("<r&{device_id}&{relay_id}\r\n\r\n")
}

/// Wrap a plaintext command into a Pnv envelope.
///
/// The declared length is the plaintext length, which equals the length of
/// the encrypted body.
pub fn encode_pnv(command: &str) -> Vec<u8> {
    let header = format!("{PNV_HEADER_NAME}: {}\r\n\r\n", command.len());
    trace!(target: "edicloud::wire::text", "{}{}", header, command);
    let mut message = Vec::with_capacity(header.len() + command.len());
    message.extend_from_slice(header.as_bytes());
    message.extend_from_slice(&encrypt(command.as_bytes(), Rotation::DEFAULT));
    message
}

/// Parse the body length out of a Pnv header (`PnvDataLen: <n>\r\n\r\n`).
pub fn parse_pnv_header(header: &[u8]) -> Result<usize, Error> {
    let text = std::str::from_utf8(header)
        .map_err(|_| Error::Protocol("Pnv header is not valid text".to_string()))?;
    let line = text.trim_end_matches(&['\r', '\n'][..]);
    let (_, value) = line
        .split_once(':')
        .ok_or_else(|| Error::Protocol(format!("Malformed Pnv header: {:?}", line)))?;
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Protocol(format!("Invalid Pnv length: {:?}", value.trim())))
}

/// Length of the raw HTTP response announced by a tunnel preamble.
pub fn parse_tunnel_preamble(preamble: &[u8]) -> Result<usize, Error> {
    if preamble.len() < TUNNEL_PREAMBLE_SIZE {
        return Err(Error::Protocol(format!(
            "Tunnel preamble must be {} bytes, got {}",
            TUNNEL_PREAMBLE_SIZE,
            preamble.len()
        )));
    }
    let mut length = &preamble[..4];
    Ok(length.get_u32_le() as usize)
}

/// Split a raw HTTP response at the first blank line.
///
/// Returns the head including the terminating `\r\n\r\n`, and the body.
pub fn split_http(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    raw.windows(DOUBLE_CRLF.len())
        .position(|w| w == DOUBLE_CRLF)
        .map(|idx| raw.split_at(idx + DOUBLE_CRLF.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::decrypt;

    #[test]
    fn test_handshake_message() {
        assert_eq!(handshake_message("AABBCC112233", "XYZ"), "<r&AABBCC112233&XYZ\r\n\r\n");
    }

    #[test]
    fn test_encode_pnv_layout() {
        let command = "<param><code value=\"1080\" /></param>";
        let message = encode_pnv(command);
        let header = format!("PnvDataLen: {}\r\n\r\n", command.len());
        assert!(message.starts_with(header.as_bytes()));
        let body = &message[header.len()..];
        assert_eq!(body.len(), command.len());
        assert_eq!(decrypt(body).text(), command);
    }

    #[test]
    fn test_parse_pnv_header() {
        assert_eq!(parse_pnv_header(b"PnvDataLen: 1234\r\n\r\n").unwrap(), 1234);
        assert_eq!(parse_pnv_header(b"PnvDataLen:7\r\n\r\n").unwrap(), 7);
        assert!(matches!(parse_pnv_header(b"garbage\r\n\r\n"), Err(Error::Protocol(_))));
        assert!(matches!(parse_pnv_header(b"PnvDataLen: abc\r\n\r\n"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_tunnel_preamble_little_endian() {
        let preamble = hex::decode("3412000000000000deadbeef").unwrap();
        assert_eq!(parse_tunnel_preamble(&preamble).unwrap(), 0x1234);
        assert!(parse_tunnel_preamble(&preamble[..4]).is_err());
    }

    #[test]
    fn test_split_http() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html>\r\n\r\n</html>";
        let (head, body) = split_http(raw).unwrap();
        assert_eq!(head, b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n");
        assert_eq!(body, b"<html>\r\n\r\n</html>");
        assert!(split_http(b"HTTP/1.1 200 OK\r\n").is_none());
    }
}
