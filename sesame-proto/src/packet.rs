// sesame-os3/sesame-proto/src/packet.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Reassembled packets in both directions.
//!
//! Client to lock: `[item_code, payload...]`.
//! Lock to client: `[op_code, item_code, payload...]`, where the first
//! payload byte of a response is its [`ResultCode`].

use serde::Serialize;

use crate::crypto::LoginToken;
use crate::error::{ProtoError, Result};
use crate::item::{ItemCode, OpCode, ResultCode};

/// Display names attached to lock/unlock commands are capped at 32 bytes.
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// A packet received from the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub op: OpCode,
    pub item: ItemCode,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(op: OpCode, item: ItemCode, payload: Vec<u8>) -> Self {
        Self { op, item, payload }
    }

    /// Parses a decrypted, reassembled frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(ProtoError::truncated("packet header", 2, data.len()));
        }
        Ok(Self {
            op: OpCode::from(data[0]),
            item: ItemCode::from(data[1]),
            payload: data[2..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.payload.len() + 2);
        data.push(self.op.into());
        data.push(self.item.into());
        data.extend_from_slice(&self.payload);
        data
    }

    /// Result code of a response, `None` when the payload is empty.
    pub fn result(&self) -> Option<ResultCode> {
        self.payload.first().map(|b| ResultCode::from(*b))
    }
}

/// Which end of the history queue a history request reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRead {
    /// Remove the oldest entry and return it.
    Pop,
    /// Return the oldest entry without removing it.
    Peek,
}

impl HistoryRead {
    pub fn as_byte(self) -> u8 {
        match self {
            HistoryRead::Pop => 0,
            HistoryRead::Peek => 1,
        }
    }
}

/// A command sent to the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub item: ItemCode,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(item: ItemCode, payload: Vec<u8>) -> Self {
        Self { item, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.payload.len() + 1);
        data.push(self.item.into());
        data.extend_from_slice(&self.payload);
        data
    }

    /// Parses a command frame. Used by device simulators.
    pub fn decode(data: &[u8]) -> Result<Self> {
        match data.split_first() {
            Some((item, payload)) => Ok(Self::new(ItemCode::from(*item), payload.to_vec())),
            None => Err(ProtoError::truncated("command", 1, 0)),
        }
    }

    /// Login proves knowledge of the device key by sending the first four
    /// bytes of the token. It is the only command sent in clear text.
    pub fn login(token: &LoginToken) -> Self {
        Self::new(ItemCode::Login, token.login_tag().to_vec())
    }

    pub fn lock(display_name: &str) -> Self {
        Self::new(ItemCode::Lock, encode_display_name(display_name))
    }

    pub fn unlock(display_name: &str) -> Self {
        Self::new(ItemCode::Unlock, encode_display_name(display_name))
    }

    pub fn version() -> Self {
        Self::new(ItemCode::Version, Vec::new())
    }

    pub fn history(read: HistoryRead) -> Self {
        Self::new(ItemCode::History, vec![read.as_byte()])
    }

    pub fn delete_history(id: u32) -> Self {
        Self::new(ItemCode::HistoryDelete, id.to_le_bytes().to_vec())
    }

    pub fn set_autolock_time(seconds: u16) -> Self {
        Self::new(ItemCode::AutolockTime, seconds.to_le_bytes().to_vec())
    }
}

/// Encodes a display name as `[len, utf8...]`.
///
/// Names longer than [`MAX_DISPLAY_NAME_LEN`] bytes are cut at the last
/// character boundary that fits, so the lock never stores a split code point.
pub fn encode_display_name(name: &str) -> Vec<u8> {
    let mut end = name.len().min(MAX_DISPLAY_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = &name.as_bytes()[..end];
    let mut data = Vec::with_capacity(bytes.len() + 1);
    data.push(bytes.len() as u8);
    data.extend_from_slice(bytes);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_packet() {
        let packet = Packet::decode(&[7, 82, 0]).unwrap();
        assert_eq!(packet.op, OpCode::Response);
        assert_eq!(packet.item, ItemCode::Lock);
        assert_eq!(packet.result(), Some(ResultCode::Success));
        assert_eq!(packet.encode(), vec![7, 82, 0]);
    }

    #[test]
    fn test_decode_short_packet() {
        let err = Packet::decode(&[8]).unwrap_err();
        assert_eq!(err, ProtoError::truncated("packet header", 2, 1));
        assert_eq!(Packet::decode(&[8, 81]).unwrap().result(), None);
    }

    #[test]
    fn test_command_layouts() {
        assert_eq!(Command::history(HistoryRead::Peek).encode(), vec![4, 1]);
        assert_eq!(Command::history(HistoryRead::Pop).encode(), vec![4, 0]);
        assert_eq!(Command::delete_history(0x0102_0304).encode(), vec![18, 4, 3, 2, 1]);
        assert_eq!(Command::set_autolock_time(300).encode(), vec![11, 0x2c, 0x01]);
        assert_eq!(Command::version().encode(), vec![5]);
        assert_eq!(Command::lock("Bob").encode(), vec![82, 3, b'B', b'o', b'b']);
    }

    #[test]
    fn test_command_decode() {
        let command = Command::decode(&[83, 1, b'x']).unwrap();
        assert_eq!(command, Command::unlock("x"));
        assert!(Command::decode(&[]).is_err());
    }

    #[test]
    fn test_display_name_truncation() {
        let long = "a".repeat(40);
        let encoded = encode_display_name(&long);
        assert_eq!(encoded[0] as usize, MAX_DISPLAY_NAME_LEN);
        assert_eq!(encoded.len(), MAX_DISPLAY_NAME_LEN + 1);

        // 31 ASCII bytes followed by a 3-byte character: the character does not fit.
        let name = format!("{}あ", "b".repeat(31));
        let encoded = encode_display_name(&name);
        assert_eq!(encoded[0], 31);
        assert!(std::str::from_utf8(&encoded[1..]).is_ok());

        assert_eq!(encode_display_name(""), vec![0]);
    }
}
