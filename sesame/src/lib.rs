// sesame-os3/sesame/src/lib.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Async client for Sesame OS3 smart locks over Bluetooth LE.
//!
//! The wire format and session crypto live in `sesame-proto`; this crate
//! adds the BLE transport, the request/response client, configuration,
//! logging and the interactive console used by the `sesame` binary.

pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod log;
pub mod transport;

pub use client::{ClientOptions, DeviceState, SesameClient};
pub use config::SesameConfig;
pub use console::Console;
pub use error::{Result, SesameError};
pub use transport::{BleLink, BleOptions, GattLink};

pub use sesame_proto as proto;
