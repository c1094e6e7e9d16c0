// sesame-os3/sesame-proto/src/event.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use serde::Serialize;

use crate::error::{ProtoError, Result};
use crate::item::{ItemCode, OpCode, ResultCode};
use crate::packet::Packet;
use crate::records::{HistoryRecord, MechSettings, MechStatus};

const VERSION_LEN: usize = 12;

/// A decoded packet from the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Published right after notifications are enabled; seeds the session.
    Initial { random_code: [u8; 4] },
    Login {
        result: ResultCode,
        /// Device clock, unix seconds. Absent on short failure responses.
        timestamp: Option<u32>,
    },
    /// `None` when the history is empty or could not be read.
    History { record: Option<HistoryRecord> },
    Version { result: ResultCode, version: String },
    AutolockTimeSet { result: ResultCode },
    HistoryDeleted { result: ResultCode },
    MechSettings { settings: MechSettings },
    MechStatus { status: MechStatus },
    Lock { result: ResultCode },
    Unlock { result: ResultCode },
    OpenSensorAutolockTime { seconds: u16 },
    Unknown {
        op: OpCode,
        item: ItemCode,
        payload: Vec<u8>,
    },
}

fn result_of(packet: &Packet) -> Result<ResultCode> {
    packet
        .result()
        .ok_or_else(|| ProtoError::truncated("result code", 1, 0))
}

impl Event {
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let payload = packet.payload.as_slice();
        let event = match packet.item {
            ItemCode::Initial => {
                let random_code: [u8; 4] = payload
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| ProtoError::truncated("random code", 4, payload.len()))?;
                Event::Initial { random_code }
            }
            ItemCode::Login => Event::Login {
                result: result_of(packet)?,
                timestamp: payload
                    .get(1..5)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            },
            ItemCode::History => {
                let record = match result_of(packet)? {
                    ResultCode::Success => Some(HistoryRecord::decode(payload)?),
                    _ => None,
                };
                Event::History { record }
            }
            ItemCode::Version => {
                let result = result_of(packet)?;
                let end = payload.len().min(1 + VERSION_LEN);
                let raw = &payload[1..end];
                let version = std::str::from_utf8(raw)
                    .map_err(|_| ProtoError::InvalidUtf8("version"))?
                    .trim_end_matches(['\0', ' '])
                    .to_string();
                Event::Version { result, version }
            }
            ItemCode::AutolockTime => Event::AutolockTimeSet {
                result: result_of(packet)?,
            },
            ItemCode::HistoryDelete => Event::HistoryDeleted {
                result: result_of(packet)?,
            },
            ItemCode::MechSettings if packet.op == OpCode::Publish => Event::MechSettings {
                settings: MechSettings::decode(payload)?,
            },
            ItemCode::MechStatus => Event::MechStatus {
                status: MechStatus::decode(payload)?,
            },
            ItemCode::Lock => Event::Lock {
                result: result_of(packet)?,
            },
            ItemCode::Unlock => Event::Unlock {
                result: result_of(packet)?,
            },
            ItemCode::OpenSensorAutolockTime => {
                if payload.len() < 2 {
                    return Err(ProtoError::truncated("auto lock time", 2, payload.len()));
                }
                Event::OpenSensorAutolockTime {
                    seconds: u16::from_le_bytes([payload[0], payload[1]]),
                }
            }
            _ => Event::Unknown {
                op: packet.op,
                item: packet.item,
                payload: packet.payload.clone(),
            },
        };
        Ok(event)
    }

    pub fn item(&self) -> ItemCode {
        match self {
            Event::Initial { .. } => ItemCode::Initial,
            Event::Login { .. } => ItemCode::Login,
            Event::History { .. } => ItemCode::History,
            Event::Version { .. } => ItemCode::Version,
            Event::AutolockTimeSet { .. } => ItemCode::AutolockTime,
            Event::HistoryDeleted { .. } => ItemCode::HistoryDelete,
            Event::MechSettings { .. } => ItemCode::MechSettings,
            Event::MechStatus { .. } => ItemCode::MechStatus,
            Event::Lock { .. } => ItemCode::Lock,
            Event::Unlock { .. } => ItemCode::Unlock,
            Event::OpenSensorAutolockTime { .. } => ItemCode::OpenSensorAutolockTime,
            Event::Unknown { item, .. } => *item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(op: u8, item: u8, payload: &[u8]) -> Packet {
        let mut data = vec![op, item];
        data.extend_from_slice(payload);
        Packet::decode(&data).unwrap()
    }

    #[test]
    fn test_initial_event() {
        let event = Event::from_packet(&packet(8, 14, &[1, 2, 3, 4])).unwrap();
        assert_eq!(event, Event::Initial { random_code: [1, 2, 3, 4] });
        assert!(Event::from_packet(&packet(8, 14, &[1, 2])).is_err());
    }

    #[test]
    fn test_login_event() {
        let event = Event::from_packet(&packet(7, 2, &[0, 0x00, 0xf1, 0x53, 0x65])).unwrap();
        assert_eq!(
            event,
            Event::Login {
                result: ResultCode::Success,
                timestamp: Some(1_700_000_000),
            }
        );
        let event = Event::from_packet(&packet(7, 2, &[1])).unwrap();
        assert_eq!(
            event,
            Event::Login {
                result: ResultCode::Other(1),
                timestamp: None,
            }
        );
    }

    #[test]
    fn test_history_event() {
        let event = Event::from_packet(&packet(7, 4, &[5])).unwrap();
        assert_eq!(event, Event::History { record: None });

        let mut payload = vec![0u8; 17];
        payload[1] = 7;
        let event = Event::from_packet(&packet(7, 4, &payload)).unwrap();
        match event {
            Event::History { record: Some(record) } => assert_eq!(record.id, 7),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_version_event() {
        let mut payload = vec![0];
        payload.extend_from_slice(b"3.0-5-18ecb9");
        payload.push(0xaa);
        let event = Event::from_packet(&packet(7, 5, &payload)).unwrap();
        assert_eq!(
            event,
            Event::Version {
                result: ResultCode::Success,
                version: "3.0-5-18ecb9".to_string(),
            }
        );

        let event = Event::from_packet(&packet(7, 5, &[0, b'v', b'1', 0, 0])).unwrap();
        assert!(matches!(event, Event::Version { ref version, .. } if version == "v1"));

        assert_eq!(
            Event::from_packet(&packet(7, 5, &[0, 0xff, 0xfe])).unwrap_err(),
            ProtoError::InvalidUtf8("version")
        );
    }

    #[test]
    fn test_mech_events() {
        let event = Event::from_packet(&packet(8, 81, &[0xb8, 0x0b, 0, 0, 0, 0, 2])).unwrap();
        assert!(matches!(event, Event::MechStatus { status } if status.lock_range));

        let settings = [0x9c, 0xff, 0x64, 0x00, 0x1e, 0x00];
        let event = Event::from_packet(&packet(8, 80, &settings)).unwrap();
        assert!(matches!(event, Event::MechSettings { settings } if settings.auto_lock_seconds == 30));

        // Settings only count when published.
        let event = Event::from_packet(&packet(7, 80, &[0])).unwrap();
        assert!(matches!(event, Event::Unknown { op: OpCode::Response, .. }));
    }

    #[test]
    fn test_command_results() {
        assert_eq!(
            Event::from_packet(&packet(7, 82, &[0])).unwrap(),
            Event::Lock { result: ResultCode::Success }
        );
        assert_eq!(
            Event::from_packet(&packet(7, 83, &[3])).unwrap(),
            Event::Unlock { result: ResultCode::Other(3) }
        );
        assert_eq!(
            Event::from_packet(&packet(7, 18, &[5])).unwrap(),
            Event::HistoryDeleted { result: ResultCode::NotFound }
        );
        assert!(Event::from_packet(&packet(7, 82, &[])).is_err());
    }

    #[test]
    fn test_open_sensor_and_unknown() {
        assert_eq!(
            Event::from_packet(&packet(8, 92, &[0x3c, 0x00])).unwrap(),
            Event::OpenSensorAutolockTime { seconds: 60 }
        );
        let event = Event::from_packet(&packet(8, 200, &[1, 2])).unwrap();
        assert_eq!(event.item(), ItemCode::Other(200));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(Event::Lock { result: ResultCode::Success }).unwrap();
        assert_eq!(json["event"], "lock");
        assert_eq!(json["result"], "success");
    }
}
