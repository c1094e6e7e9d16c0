// sesame-os3/sesame-proto/src/records.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed-layout records reported by the lock.
//!
//! All multi-byte integers are little-endian.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{ProtoError, Result};

fn require(data: &[u8], what: &'static str, need: usize) -> Result<()> {
    if data.len() < need {
        return Err(ProtoError::truncated(what, need, data.len()));
    }
    Ok(())
}

fn u16_at(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn i16_at(data: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([data[at], data[at + 1]])
}

fn u32_at(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Mechanical state of the lock: battery, motor target and position, flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MechStatus {
    /// Raw battery reading.
    pub battery: u16,
    pub target: i16,
    pub position: i16,
    pub clutch_failed: bool,
    /// The thumb turn is inside the configured locked range.
    pub lock_range: bool,
    pub unlock_range: bool,
    pub critical: bool,
    pub stop: bool,
    pub low_battery: bool,
    pub clockwise: bool,
}

impl MechStatus {
    pub const LEN: usize = 7;

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, "mech status", Self::LEN)?;
        let flags = data[6];
        let bit = |n: u8| (flags >> n) & 1 == 1;
        Ok(Self {
            battery: u16_at(data, 0),
            target: i16_at(data, 2),
            position: i16_at(data, 4),
            clutch_failed: bit(0),
            lock_range: bit(1),
            unlock_range: bit(2),
            critical: bit(3),
            stop: bit(4),
            low_battery: bit(5),
            clockwise: bit(6),
        })
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut data = [0u8; Self::LEN];
        data[0..2].copy_from_slice(&self.battery.to_le_bytes());
        data[2..4].copy_from_slice(&self.target.to_le_bytes());
        data[4..6].copy_from_slice(&self.position.to_le_bytes());
        let flags = [
            self.clutch_failed,
            self.lock_range,
            self.unlock_range,
            self.critical,
            self.stop,
            self.low_battery,
            self.clockwise,
        ];
        data[6] = flags
            .iter()
            .enumerate()
            .fold(0u8, |acc, (n, set)| acc | ((*set as u8) << n));
        data
    }
}

impl fmt::Display for MechStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "battery: {}, target: {}, position: {}, locked: {}, unlocked: {}, stop: {}, low battery: {}, clutch failed: {}, critical: {}, clockwise: {}",
            self.battery,
            self.target,
            self.position,
            self.lock_range,
            self.unlock_range,
            self.stop,
            self.low_battery,
            self.clutch_failed,
            self.critical,
            self.clockwise,
        )
    }
}

/// Lock/unlock angles and auto-lock delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MechSettings {
    pub lock: i16,
    pub unlock: i16,
    pub auto_lock_seconds: u16,
}

impl MechSettings {
    pub const LEN: usize = 6;

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, "mech settings", Self::LEN)?;
        Ok(Self {
            lock: i16_at(data, 0),
            unlock: i16_at(data, 2),
            auto_lock_seconds: u16_at(data, 4),
        })
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut data = [0u8; Self::LEN];
        data[0..2].copy_from_slice(&self.lock.to_le_bytes());
        data[2..4].copy_from_slice(&self.unlock.to_le_bytes());
        data[4..6].copy_from_slice(&self.auto_lock_seconds.to_le_bytes());
        data
    }
}

impl fmt::Display for MechSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock: {}, unlock: {}, auto lock: {}s",
            self.lock, self.unlock, self.auto_lock_seconds
        )
    }
}

/// What caused a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    None,
    BleLock,
    BleUnlock,
    TimeChanged,
    AutolockUpdated,
    MechSettingUpdated,
    Autolock,
    ManualLocked,
    ManualUnlocked,
    ManualElse,
    DriveLocked,
    DriveUnlocked,
    DriveFailed,
    BleAdvParamUpdated,
    Wm2Lock,
    Wm2Unlock,
    WebLock,
    WebUnlock,
    Other(u8),
}

impl From<u8> for HistoryType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::BleLock,
            2 => Self::BleUnlock,
            3 => Self::TimeChanged,
            4 => Self::AutolockUpdated,
            5 => Self::MechSettingUpdated,
            6 => Self::Autolock,
            7 => Self::ManualLocked,
            8 => Self::ManualUnlocked,
            9 => Self::ManualElse,
            10 => Self::DriveLocked,
            11 => Self::DriveUnlocked,
            12 => Self::DriveFailed,
            13 => Self::BleAdvParamUpdated,
            14 => Self::Wm2Lock,
            15 => Self::Wm2Unlock,
            16 => Self::WebLock,
            17 => Self::WebUnlock,
            other => Self::Other(other),
        }
    }
}

impl From<HistoryType> for u8 {
    fn from(kind: HistoryType) -> Self {
        match kind {
            HistoryType::None => 0,
            HistoryType::BleLock => 1,
            HistoryType::BleUnlock => 2,
            HistoryType::TimeChanged => 3,
            HistoryType::AutolockUpdated => 4,
            HistoryType::MechSettingUpdated => 5,
            HistoryType::Autolock => 6,
            HistoryType::ManualLocked => 7,
            HistoryType::ManualUnlocked => 8,
            HistoryType::ManualElse => 9,
            HistoryType::DriveLocked => 10,
            HistoryType::DriveUnlocked => 11,
            HistoryType::DriveFailed => 12,
            HistoryType::BleAdvParamUpdated => 13,
            HistoryType::Wm2Lock => 14,
            HistoryType::Wm2Unlock => 15,
            HistoryType::WebLock => 16,
            HistoryType::WebUnlock => 17,
            HistoryType::Other(code) => code,
        }
    }
}

/// One entry of the lock's history queue.
///
/// Layout, relative to the response payload (which starts with the result
/// code): id `[1..5]`, type `[5]`, unix timestamp `[6..10]`, mech status
/// `[10..17]`, trailing bytes `[17..]` kept as `ss5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub id: u32,
    pub kind: HistoryType,
    /// Seconds since the unix epoch, device clock.
    pub timestamp: u32,
    pub mech_status: MechStatus,
    pub ss5: Vec<u8>,
}

impl HistoryRecord {
    const FIXED_LEN: usize = 17;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        require(payload, "history record", Self::FIXED_LEN)?;
        Ok(Self {
            id: u32_at(payload, 1),
            kind: HistoryType::from(payload[5]),
            timestamp: u32_at(payload, 6),
            mech_status: MechStatus::decode(&payload[10..17])?,
            ss5: payload[Self::FIXED_LEN..].to_vec(),
        })
    }

    /// Encodes the record as a successful history response payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::FIXED_LEN + self.ss5.len());
        data.push(0);
        data.extend_from_slice(&self.id.to_le_bytes());
        data.push(self.kind.into());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.mech_status.encode());
        data.extend_from_slice(&self.ss5);
        data
    }

    pub fn datetime(&self) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(i64::from(self.timestamp))
            .map_err(|_| ProtoError::InvalidTimestamp(self.timestamp))
    }

    /// Name of whoever triggered the entry, when `ss5` holds `[len, utf8...]`.
    pub fn display_name(&self) -> Option<String> {
        let (len, rest) = self.ss5.split_first()?;
        let name = rest.get(..*len as usize)?;
        std::str::from_utf8(name).ok().map(str::to_string)
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = self
            .datetime()
            .ok()
            .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_else(|| "<invalid-timestamp>".to_string());
        write!(f, "#{} {:?} at {}", self.id, self.kind, when)?;
        if let Some(name) = self.display_name() {
            write!(f, " by {:?}", name)?;
        }
        write!(f, " ({})", self.mech_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mech_status_decode() {
        // battery 0x0bb8, target -32768, position 0x00c8, flags: lock_range | stop
        let data = [0xb8, 0x0b, 0x00, 0x80, 0xc8, 0x00, 0b0001_0010];
        let status = MechStatus::decode(&data).unwrap();
        assert_eq!(status.battery, 3000);
        assert_eq!(status.target, i16::MIN);
        assert_eq!(status.position, 200);
        assert!(status.lock_range);
        assert!(status.stop);
        assert!(!status.unlock_range);
        assert!(!status.clutch_failed);
        assert!(!status.clockwise);
        assert_eq!(status.encode(), data);
    }

    #[test]
    fn test_mech_status_all_flags() {
        let status = MechStatus::decode(&[0, 0, 0, 0, 0, 0, 0x7f]).unwrap();
        assert!(status.clutch_failed && status.lock_range && status.unlock_range);
        assert!(status.critical && status.stop && status.low_battery && status.clockwise);
    }

    #[test]
    fn test_mech_status_truncated() {
        let err = MechStatus::decode(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, ProtoError::truncated("mech status", 7, 3));
    }

    #[test]
    fn test_mech_settings_decode() {
        let data = [0x9c, 0xff, 0x64, 0x00, 0x1e, 0x00];
        let settings = MechSettings::decode(&data).unwrap();
        assert_eq!(settings.lock, -100);
        assert_eq!(settings.unlock, 100);
        assert_eq!(settings.auto_lock_seconds, 30);
        assert_eq!(settings.to_string(), "lock: -100, unlock: 100, auto lock: 30s");
    }

    #[test]
    fn test_history_record_decode() {
        let mut payload = vec![0, 0x2a, 0, 0, 0, 2];
        payload.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        payload.extend_from_slice(&[0x10, 0x0e, 0, 0, 0, 0, 0b0000_0100]);
        payload.extend_from_slice(&[5, b'A', b'l', b'i', b'c', b'e', 0xff]);

        let record = HistoryRecord::decode(&payload).unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.kind, HistoryType::BleUnlock);
        assert_eq!(record.timestamp, 1_700_000_000);
        assert!(record.mech_status.unlock_range);
        assert_eq!(record.display_name().as_deref(), Some("Alice"));
        assert_eq!(record.datetime().unwrap().year(), 2023);
        assert_eq!(record.encode(), payload);
    }

    #[test]
    fn test_history_record_without_name() {
        let mut payload = vec![0u8; 17];
        payload[5] = 6;
        let record = HistoryRecord::decode(&payload).unwrap();
        assert_eq!(record.kind, HistoryType::Autolock);
        assert!(record.ss5.is_empty());
        assert_eq!(record.display_name(), None);

        // Length prefix larger than the remaining bytes.
        let mut payload = vec![0u8; 17];
        payload.extend_from_slice(&[9, b'x']);
        assert_eq!(HistoryRecord::decode(&payload).unwrap().display_name(), None);
    }

    #[test]
    fn test_history_record_truncated() {
        assert!(matches!(
            HistoryRecord::decode(&[0; 10]),
            Err(ProtoError::Truncated { need: 17, got: 10, .. })
        ));
    }

    #[test]
    fn test_history_type_mapping() {
        for code in 0..=u8::MAX {
            assert_eq!(u8::from(HistoryType::from(code)), code);
        }
        assert_eq!(HistoryType::from(17), HistoryType::WebUnlock);
        assert_eq!(HistoryType::from(18), HistoryType::Other(18));
    }
}
