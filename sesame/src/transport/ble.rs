// sesame-os3/sesame/src/transport/ble.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! btleplug implementation of [`GattLink`].

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use super::{BleOptions, GattLink, NOTIFICATION_QUEUE, NOTIFY_CHARACTERISTIC, WRITE_CHARACTERISTIC};
use crate::error::{Result as SesameResult, SesameError};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BleLink {
    address: String,
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    receiver: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BleLink {
    /// Scans for the lock with the given address, connects and subscribes
    /// to notifications.
    ///
    /// The address is compared case-insensitively against the peripheral's
    /// Bluetooth address and its platform id (CoreBluetooth does not expose
    /// addresses).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - no Bluetooth adapter is present,
    /// - the lock is not seen within `scan_timeout`,
    /// - connecting takes longer than `connect_timeout`,
    /// - the Sesame characteristics are missing.
    pub async fn connect(address: &str, options: &BleOptions) -> SesameResult<Self> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(SesameError::NoAdapter)?;

        central.start_scan(ScanFilter::default()).await?;
        tracing::debug!("Scanning for {}", address);
        let found = timeout(options.scan_timeout, find_peripheral(&central, address)).await;
        if let Err(e) = central.stop_scan().await {
            tracing::warn!("Failed to stop scan: {}", e);
        }
        let peripheral = found.map_err(|_| SesameError::DeviceNotFound(address.to_string()))??;

        timeout(options.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| SesameError::ConnectTimeout(address.to_string()))??;
        tracing::info!("Connected to {}", address);

        peripheral.discover_services().await?;
        let characteristics = peripheral.characteristics();
        let write_char = find_characteristic(&characteristics, WRITE_CHARACTERISTIC)?;
        let notify_char = find_characteristic(&characteristics, NOTIFY_CHARACTERISTIC)?;

        // Take the stream before subscribing so the initial publish is not lost.
        let mut stream = peripheral.notifications().await?;
        peripheral.subscribe(&notify_char).await?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        let forwarder = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != NOTIFY_CHARACTERISTIC {
                    continue;
                }
                tracing::trace!("recv: {}", hex::encode(&notification.value));
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Notification stream ended");
        });

        Ok(Self {
            address: address.to_string(),
            peripheral,
            write_char,
            notify_char,
            receiver: Mutex::new(Some(rx)),
            forwarder: Mutex::new(Some(forwarder)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

async fn find_peripheral(central: &Adapter, address: &str) -> SesameResult<Peripheral> {
    loop {
        for peripheral in central.peripherals().await? {
            if matches_address(&peripheral, address) {
                return Ok(peripheral);
            }
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

fn matches_address(peripheral: &Peripheral, address: &str) -> bool {
    address_matches(&peripheral.address().to_string(), &peripheral.id().to_string(), address)
}

/// Exact, case-insensitive match on either the Bluetooth address or the
/// platform id. Partial ids never match.
fn address_matches(bd_addr: &str, platform_id: &str, wanted: &str) -> bool {
    let wanted = wanted.trim();
    !wanted.is_empty()
        && (bd_addr.eq_ignore_ascii_case(wanted) || platform_id.eq_ignore_ascii_case(wanted))
}

fn find_characteristic(characteristics: &BTreeSet<Characteristic>, uuid: Uuid) -> SesameResult<Characteristic> {
    characteristics
        .iter()
        .find(|c| c.uuid == uuid)
        .cloned()
        .ok_or(SesameError::CharacteristicNotFound(uuid))
}

#[async_trait]
impl GattLink for BleLink {
    async fn write(&self, segment: &[u8]) -> SesameResult<()> {
        tracing::trace!("Writing data: {}", hex::encode(segment));
        self.peripheral
            .write(&self.write_char, segment, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn notifications(&self) -> SesameResult<mpsc::Receiver<Vec<u8>>> {
        self.receiver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or_else(|| SesameError::Internal("notification stream already taken".into()))
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> SesameResult<()> {
        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = forwarder {
            handle.abort();
        }

        if !self.is_connected().await {
            tracing::warn!("{} is not connected", self.address);
            return Ok(());
        }
        self.peripheral.unsubscribe(&self.notify_char).await?;
        self.peripheral.disconnect().await?;
        tracing::info!("Disconnected from {}", self.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_matches_exact_address_or_id() {
        assert!(address_matches("AA:BB:CC:DD:EE:FF", "hci0/dev_AA_BB_CC_DD_EE_FF", "aa:bb:cc:dd:ee:ff"));
        assert!(address_matches(
            "00:00:00:00:00:00",
            "5A1C2F3E-0000-4000-8000-00805F9B34FB",
            "5a1c2f3e-0000-4000-8000-00805f9b34fb"
        ));
    }

    #[test]
    fn test_address_rejects_partial_ids() {
        assert!(!address_matches("AA:BB:CC:DD:EE:FF", "hci0/dev_AA_BB_CC_DD_EE_FF", "AA:BB"));
        assert!(!address_matches(
            "00:00:00:00:00:00",
            "5A1C2F3E-0000-4000-8000-00805F9B34FB",
            "5A1C"
        ));
        assert!(!address_matches("AA:BB:CC:DD:EE:FF", "hci0/dev_AA_BB_CC_DD_EE_FF", ""));
    }
}
