// sesame-os3/sesame-proto/src/lib.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Sesame OS3 BLE wire protocol.
//!
//! This crate holds everything that can be expressed without touching a
//! radio: item codes, packet framing, device record decoding, GATT
//! segmentation and the login / session cryptography. It is shared by the
//! `sesame` client and by the simulated lock used in its tests.

pub mod crypto;
pub mod error;
pub mod event;
pub mod item;
pub mod packet;
pub mod records;
pub mod segment;

pub use crypto::{login_token, DeviceKey, LoginToken, SessionCipher};
pub use error::{ProtoError, Result};
pub use event::Event;
pub use item::{ItemCode, OpCode, ResultCode};
pub use packet::{Command, HistoryRead, Packet};
pub use records::{HistoryRecord, HistoryType, MechSettings, MechStatus};
pub use segment::{segment, Frame, Reassembler};
