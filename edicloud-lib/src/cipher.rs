//! Bit-rotation stream obfuscation applied to every message on the wire.
//!
//! The first byte carries the rotation amount as its offset from `<`
//! (every plaintext message starts with `<`). Every following byte is
//! rotated right by the rotation amount when encrypting and rotated back
//! left when decrypting, computed the way the device firmware does: shift
//! within a 16-bit window, then fold the high byte back onto the low byte.
//!
//! Decryption never computes the first character. It always yields `<`,
//! which is what the firmware does; do not "fix" it.

use crate::constants::{DEFAULT_ROTATION, SENTINEL};
use crate::error::Error;
use std::fmt;

/// Rotation amount for encryption, always in `1..=7`.
///
/// Zero is reserved for "not yet determined" while decrypting and can
/// never be constructed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation(u8);

impl Rotation {
    /// The only rotation the devices use in practice.
    pub const DEFAULT: Rotation = Rotation(DEFAULT_ROTATION);

    pub fn new(amount: u8) -> Result<Self, Error> {
        if (1..=7).contains(&amount) {
            Ok(Self(amount))
        } else {
            Err(Error::InvalidRotation(amount))
        }
    }

    pub fn amount(&self) -> u8 {
        self.0
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of decrypting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// Decoded bytes; the first one is always `<`
    pub bytes: Vec<u8>,
    /// Rotation recovered from the first byte
    pub rotation: u8,
}

impl Decrypted {
    /// Decoded bytes as text, one character per byte.
    pub fn text(&self) -> String {
        self.bytes.iter().map(|&b| b as char).collect()
    }
}

#[inline]
fn fold(shifted: u32) -> u8 {
    ((shifted & 0xFF) | ((shifted & 0xFF00) >> 8)) as u8
}

/// Encrypt `plain` with the given rotation.
pub fn encrypt(plain: &[u8], rotation: Rotation) -> Vec<u8> {
    let r = rotation.amount() as u32;
    plain
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if i == 0 {
                b.wrapping_add(rotation.amount())
            } else {
                fold((b as u32) << (8 - r))
            }
        })
        .collect()
}

/// Decrypt a message, recovering the rotation from its first byte.
///
/// While the recovered rotation is still zero (the leading byte was a
/// literal `<`) the next byte is treated as the first one again.
pub fn decrypt(cipher: &[u8]) -> Decrypted {
    let mut rotation: u8 = 0;
    let bytes = cipher
        .iter()
        .map(|&b| {
            if rotation == 0 {
                rotation = b.wrapping_sub(SENTINEL);
                SENTINEL
            } else {
                fold((b as u32).wrapping_shl(rotation as u32))
            }
        })
        .collect();
    Decrypted { bytes, rotation }
}

/// Convenience for encrypting text with the default rotation.
pub fn encrypt_text(text: &str) -> Vec<u8> {
    encrypt(text.as_bytes(), Rotation::DEFAULT)
}
