// sesame-os3/sesame-proto/src/item.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Item codes, op codes and result codes.
//!
//! Every command the client sends starts with an item code byte. Every
//! packet the lock sends starts with an op code (response or publish)
//! followed by the item code it belongs to.

use std::fmt;

use serde::Serialize;

/// Identifies a command and the response or publication that goes with it.
///
/// Conversions from `u8` are lossless: bytes without a named variant map to
/// [`ItemCode::Other`]. Construct values through `From<u8>` so that a known
/// code never ends up wrapped in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCode {
    Login,
    History,
    Version,
    AutolockTime,
    Initial,
    HistoryDelete,
    MechSettings,
    MechStatus,
    Lock,
    Unlock,
    OpenSensorAutolockTime,
    Other(u8),
}

impl From<u8> for ItemCode {
    fn from(code: u8) -> Self {
        match code {
            2 => Self::Login,
            4 => Self::History,
            5 => Self::Version,
            11 => Self::AutolockTime,
            14 => Self::Initial,
            18 => Self::HistoryDelete,
            80 => Self::MechSettings,
            81 => Self::MechStatus,
            82 => Self::Lock,
            83 => Self::Unlock,
            92 => Self::OpenSensorAutolockTime,
            other => Self::Other(other),
        }
    }
}

impl From<ItemCode> for u8 {
    fn from(item: ItemCode) -> Self {
        match item {
            ItemCode::Login => 2,
            ItemCode::History => 4,
            ItemCode::Version => 5,
            ItemCode::AutolockTime => 11,
            ItemCode::Initial => 14,
            ItemCode::HistoryDelete => 18,
            ItemCode::MechSettings => 80,
            ItemCode::MechStatus => 81,
            ItemCode::Lock => 82,
            ItemCode::Unlock => 83,
            ItemCode::OpenSensorAutolockTime => 92,
            ItemCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ItemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemCode::Login => "login",
            ItemCode::History => "history",
            ItemCode::Version => "version",
            ItemCode::AutolockTime => "autolock_time",
            ItemCode::Initial => "initial",
            ItemCode::HistoryDelete => "history_delete",
            ItemCode::MechSettings => "mech_settings",
            ItemCode::MechStatus => "mech_status",
            ItemCode::Lock => "lock",
            ItemCode::Unlock => "unlock",
            ItemCode::OpenSensorAutolockTime => "open_sensor_autolock_time",
            ItemCode::Other(code) => return write!(f, "item#{}", code),
        };
        write!(f, "{}({})", name, u8::from(*self))
    }
}

/// First byte of every packet sent by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    /// Answer to a command sent by the client.
    Response,
    /// Unsolicited notification (initial random code, mech status, ...).
    Publish,
    Other(u8),
}

impl From<u8> for OpCode {
    fn from(code: u8) -> Self {
        match code {
            7 => Self::Response,
            8 => Self::Publish,
            other => Self::Other(other),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::Response => 7,
            OpCode::Publish => 8,
            OpCode::Other(code) => code,
        }
    }
}

/// Status byte carried by responses right after the item code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    /// Requested entry does not exist (e.g. the history is empty).
    NotFound,
    Other(u8),
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl From<u8> for ResultCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Success,
            5 => Self::NotFound,
            other => Self::Other(other),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(result: ResultCode) -> Self {
        match result {
            ResultCode::Success => 0,
            ResultCode::NotFound => 5,
            ResultCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "success"),
            ResultCode::NotFound => write!(f, "not found"),
            ResultCode::Other(code) => write!(f, "code {}", code),
        }
    }
}
