// sesame-os3/sesame/src/transport/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! GATT transport.
//!
//! The client only needs three things from a link: write a segment to the
//! command characteristic, receive notification segments, and disconnect.
//! [`GattLink`] captures that so the protocol can run over btleplug in
//! production and over an in-process simulated lock in tests.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result as SesameResult;

mod ble;

pub use ble::BleLink;

/// Characteristic the client writes command segments to.
pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x16860002_a5ae_9856_b6d3_dbb4c676993e);

/// Characteristic the lock sends notification segments on.
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x16860003_a5ae_9856_b6d3_dbb4c676993e);

/// Notification segments buffered between the radio and the client.
pub const NOTIFICATION_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct BleOptions {
    /// How long to scan for the lock before giving up.
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for BleOptions {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// A connected GATT link to a lock.
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Writes one segment (header byte included) to the command characteristic.
    async fn write(&self, segment: &[u8]) -> SesameResult<()>;

    /// Hands out the notification stream. There is a single consumer;
    /// later calls fail.
    async fn notifications(&self) -> SesameResult<mpsc::Receiver<Vec<u8>>>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> SesameResult<()>;
}
