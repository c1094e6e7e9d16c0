// sesame-os3/sesame-proto/src/error.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

/// Result type alias for `sesame-proto` operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors raised while decoding device data or running the session crypto.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Input is shorter than the structure being decoded.
    #[error("Truncated {what}: need {need} bytes, got {got}")]
    Truncated {
        what: &'static str,
        need: usize,
        got: usize,
    },

    /// Device keys are AES-128 keys.
    #[error("Invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// CCM tag mismatch or malformed ciphertext.
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// A text field sent by the device is not valid UTF-8.
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A device timestamp could not be represented.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(u32),
}

impl ProtoError {
    pub(crate) fn truncated(what: &'static str, need: usize, got: usize) -> Self {
        Self::Truncated { what, need, got }
    }
}
