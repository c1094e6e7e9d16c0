// sesame-os3/sesame/src/client/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Sesame OS3 client.
//!
//! [`SesameClient`] drives one connection to a lock:
//! - a background receive task reassembles notification segments,
//!   decrypts them once the session is up, decodes packets, hands
//!   responses to the request waiting for them and broadcasts every
//!   decoded [`Event`];
//! - commands are encrypted and written under a send gate, so the CCM
//!   counter order always matches the order segments reach the lock;
//! - every request, from queueing for the send gate to its response,
//!   takes at most `command_timeout`. A response that arrives after its
//!   request gave up is discarded.
//!
//! The connection starts with the lock publishing a random code. The
//! client derives the session token from it, installs the session cipher
//! and logs in; from then on the lock only speaks encrypted and plain
//! frames are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use sesame_proto::{
    login_token, segment, Command, DeviceKey, Event, Frame, HistoryRead, HistoryRecord, ItemCode,
    MechSettings, MechStatus, OpCode, Packet, Reassembler, SessionCipher,
};

use crate::error::{Result as SesameResult, SesameError};
use crate::transport::GattLink;

mod router;

use router::{Resolution, Router};

/// Events buffered per subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub command_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
        }
    }
}

/// Latest state reported by the lock.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub mech_status: Option<MechStatus>,
    pub mech_settings: Option<MechSettings>,
    /// Device clock at login, unix seconds.
    pub login_time: Option<u32>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the client handle and its receive task.
struct Shared {
    cipher: Mutex<Option<SessionCipher>>,
    router: Mutex<Router>,
    state: Mutex<DeviceState>,
    events: broadcast::Sender<Event>,
}

impl Shared {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cipher: Mutex::new(None),
            router: Mutex::new(Router::default()),
            state: Mutex::new(DeviceState::default()),
            events,
        }
    }

    fn seal(&self, plain: &[u8]) -> SesameResult<Vec<u8>> {
        let mut cipher = lock(&self.cipher);
        match cipher.as_mut() {
            Some(session) => Ok(session.encrypt(plain)?),
            None => Err(SesameError::NotLoggedIn),
        }
    }

    /// Turns a reassembled frame into packet bytes, or `None` if it must be dropped.
    fn open(&self, frame: Frame) -> Option<Vec<u8>> {
        let mut cipher = lock(&self.cipher);
        match (frame.encrypted, cipher.as_mut()) {
            (true, Some(session)) => match session.decrypt(&frame.data) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::warn!("Dropping frame: {}", e);
                    None
                }
            },
            (true, None) => {
                tracing::warn!("Dropping encrypted frame received before login");
                None
            }
            (false, Some(_)) => {
                tracing::debug!("Dropping plain frame received after login");
                None
            }
            (false, None) => Some(frame.data),
        }
    }

    fn handle_frame(&self, frame: Frame) {
        let Some(data) = self.open(frame) else {
            return;
        };
        let packet = match Packet::decode(&data) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Dropping malformed packet: {}", e);
                return;
            }
        };
        tracing::debug!(
            op = ?packet.op,
            item = %packet.item,
            payload = %hex::encode(&packet.payload),
            "Received packet"
        );

        match lock(&self.router).resolve(&packet) {
            Resolution::Discarded => {
                tracing::debug!(item = %packet.item, "Discarding late response");
            }
            Resolution::Unmatched if packet.op == OpCode::Response => {
                tracing::debug!(item = %packet.item, "No request waiting for this response");
            }
            _ => {}
        }

        match Event::from_packet(&packet) {
            Ok(event) => {
                self.record(&event);
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
            Err(e) => tracing::warn!(item = %packet.item, "Failed to decode event: {}", e),
        }
    }

    fn record(&self, event: &Event) {
        match event {
            Event::Initial { random_code } => {
                tracing::debug!("Random code: {}", hex::encode(random_code));
            }
            Event::Login { result, timestamp } => {
                tracing::info!(%result, ?timestamp, "Login response");
                if result.is_success() {
                    lock(&self.state).login_time = *timestamp;
                }
            }
            Event::MechStatus { status } => {
                tracing::debug!("Mech status: {}", status);
                lock(&self.state).mech_status = Some(*status);
            }
            Event::MechSettings { settings } => {
                tracing::debug!("Mech settings: {}", settings);
                lock(&self.state).mech_settings = Some(*settings);
            }
            Event::Lock { result } => tracing::info!(%result, "Lock response"),
            Event::Unlock { result } => tracing::info!(%result, "Unlock response"),
            Event::History { record: Some(record) } => tracing::debug!("History: {}", record),
            Event::History { record: None } => tracing::debug!("History is empty"),
            Event::Version { version, .. } => tracing::debug!("Version: {}", version),
            Event::OpenSensorAutolockTime { seconds } => {
                tracing::info!("Open sensor auto lock time: {}s", seconds);
            }
            Event::Unknown { item, .. } => tracing::debug!("Unhandled item code: {}", item),
            Event::AutolockTimeSet { .. } | Event::HistoryDeleted { .. } => {}
        }
    }
}

/// A registered request.
///
/// Dropped before its command went out, the waiter is removed. Dropped
/// after, the waiter stays queued and absorbs the late response.
struct PendingRequest {
    shared: Arc<Shared>,
    item: ItemCode,
    id: u64,
    rx: oneshot::Receiver<Packet>,
    sent: bool,
}

impl PendingRequest {
    fn register(shared: &Arc<Shared>, item: ItemCode) -> SesameResult<Self> {
        let (id, rx) = lock(&shared.router)
            .register(item)
            .ok_or(SesameError::NotConnected)?;
        Ok(Self {
            shared: shared.clone(),
            item,
            id,
            rx,
            sent: false,
        })
    }

    async fn reply(&mut self) -> SesameResult<Packet> {
        (&mut self.rx).await.map_err(|_| SesameError::NotConnected)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.sent {
            lock(&self.shared.router).cancel(self.item, self.id);
        }
    }
}

/// Runs until the notification stream closes or a shutdown is signalled.
async fn receive_loop(
    mut notifications: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut reassembler = Reassembler::new();
    loop {
        tokio::select! {
            notification = notifications.recv() => {
                match notification {
                    Some(segment) => {
                        if let Some(frame) = reassembler.push(&segment) {
                            shared.handle_frame(frame);
                        }
                    }
                    None => {
                        tracing::info!("Notification stream closed");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::debug!("Receive task received shutdown signal");
                break;
            }
        }
    }
    // Pending and future requests fail with `NotConnected` instead of timing out.
    lock(&shared.router).close();
}

pub struct SesameClient<L: GattLink> {
    link: Arc<L>,
    shared: Arc<Shared>,
    options: ClientOptions,
    send_gate: tokio::sync::Mutex<()>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    receiver: Option<JoinHandle<()>>,
}

impl<L: GattLink> SesameClient<L> {
    /// Starts the receive task on `link` and logs in with `key`.
    ///
    /// On failure the link is disconnected before the error is returned.
    pub async fn connect(link: L, key: DeviceKey, options: ClientOptions) -> SesameResult<Self> {
        let link = Arc::new(link);
        let shared = Arc::new(Shared::new());

        // Registered before the stream is taken; the lock publishes right away.
        let mut initial = PendingRequest::register(&shared, ItemCode::Initial)?;
        initial.sent = true;
        let notifications = link.notifications().await?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let receiver = tokio::spawn(receive_loop(notifications, shared.clone(), shutdown_rx));

        let client = Self {
            link,
            shared,
            options,
            send_gate: tokio::sync::Mutex::new(()),
            shutdown_tx: Some(shutdown_tx),
            receiver: Some(receiver),
        };

        let outcome = client.login(&key, initial).await;
        match outcome {
            Ok(()) => Ok(client),
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                if let Err(close_err) = client.disconnect().await {
                    tracing::warn!("Failed to disconnect after login failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn login(&self, key: &DeviceKey, mut initial_request: PendingRequest) -> SesameResult<()> {
        let initial = match timeout(self.options.command_timeout, initial_request.reply()).await {
            Ok(packet) => packet?,
            Err(_) => return Err(self.timed_out(ItemCode::Initial)),
        };
        let random_code = match Event::from_packet(&initial)? {
            Event::Initial { random_code } => random_code,
            other => {
                return Err(SesameError::UnexpectedResponse(format!("{:?}", other)));
            }
        };

        let token = login_token(key, &random_code)?;
        *lock(&self.shared.cipher) = Some(SessionCipher::new(&token, random_code));

        let response = self
            .send_and_wait(&Command::login(&token), false, ItemCode::Login)
            .await?;
        match Event::from_packet(&response)? {
            Event::Login { result, .. } if result.is_success() => Ok(()),
            Event::Login { result, .. } => Err(SesameError::Rejected {
                item: ItemCode::Login,
                result,
            }),
            other => Err(SesameError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Subscribes to every event decoded from now on, including
    /// unsolicited mech status publications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> DeviceState {
        lock(&self.shared.state).clone()
    }

    pub fn mech_status(&self) -> Option<MechStatus> {
        lock(&self.shared.state).mech_status
    }

    pub fn mech_settings(&self) -> Option<MechSettings> {
        lock(&self.shared.state).mech_settings
    }

    pub async fn is_connected(&self) -> bool {
        let closed = lock(&self.shared.router).is_closed();
        !closed && self.link.is_connected().await
    }

    /// Locks, recording `display_name` (at most 32 bytes) in the lock history.
    pub async fn lock(&self, display_name: &str) -> SesameResult<()> {
        let response = self
            .send_and_wait(&Command::lock(display_name), true, ItemCode::Lock)
            .await?;
        expect_success(&response)
    }

    pub async fn unlock(&self, display_name: &str) -> SesameResult<()> {
        let response = self
            .send_and_wait(&Command::unlock(display_name), true, ItemCode::Unlock)
            .await?;
        expect_success(&response)
    }

    pub async fn set_autolock_time(&self, seconds: u16) -> SesameResult<()> {
        let response = self
            .send_and_wait(&Command::set_autolock_time(seconds), true, ItemCode::AutolockTime)
            .await?;
        expect_success(&response)
    }

    /// Firmware version string.
    pub async fn version(&self) -> SesameResult<String> {
        let response = self
            .send_and_wait(&Command::version(), true, ItemCode::Version)
            .await?;
        match Event::from_packet(&response)? {
            Event::Version { result, version } if result.is_success() => Ok(version),
            Event::Version { result, .. } => Err(SesameError::Rejected {
                item: ItemCode::Version,
                result,
            }),
            other => Err(SesameError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Reads one history entry. `None` when the history is empty.
    pub async fn history(&self, read: HistoryRead) -> SesameResult<Option<HistoryRecord>> {
        let response = self
            .send_and_wait(&Command::history(read), true, ItemCode::History)
            .await?;
        match Event::from_packet(&response)? {
            Event::History { record } => {
                if record.is_none() {
                    tracing::debug!(result = ?response.result(), "No history entry returned");
                }
                Ok(record)
            }
            other => Err(SesameError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    pub async fn history_peek(&self) -> SesameResult<Option<HistoryRecord>> {
        self.history(HistoryRead::Peek).await
    }

    pub async fn history_pop(&self) -> SesameResult<Option<HistoryRecord>> {
        self.history(HistoryRead::Pop).await
    }

    pub async fn delete_history(&self, id: u32) -> SesameResult<()> {
        let response = self
            .send_and_wait(&Command::delete_history(id), true, ItemCode::HistoryDelete)
            .await?;
        expect_success(&response)?;
        tracing::info!("History entry {} deleted", id);
        Ok(())
    }

    /// Sends an arbitrary encrypted command and returns the matching response.
    pub async fn send_raw(&self, item: u8, payload: Vec<u8>) -> SesameResult<Packet> {
        let item = ItemCode::from(item);
        self.send_and_wait(&Command::new(item, payload), true, item).await
    }

    /// Sends `command` and waits for the next packet carrying `response_item`.
    ///
    /// The send and the wait together are bounded by `command_timeout`.
    pub async fn send_and_wait(
        &self,
        command: &Command,
        encrypted: bool,
        response_item: ItemCode,
    ) -> SesameResult<Packet> {
        let mut request = PendingRequest::register(&self.shared, response_item)?;
        let exchange = async {
            self.send(command, encrypted).await?;
            request.sent = true;
            request.reply().await
        };
        match timeout(self.options.command_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(response_item)),
        }
    }

    async fn send(&self, command: &Command, encrypted: bool) -> SesameResult<()> {
        let _gate = self.send_gate.lock().await;
        tracing::debug!(
            item = %command.item,
            payload = %hex::encode(&command.payload),
            encrypted,
            "Sending command"
        );
        let plain = command.encode();
        let data = if encrypted { self.shared.seal(&plain)? } else { plain };
        for segment in segment(&data, encrypted) {
            self.link.write(&segment).await?;
        }
        Ok(())
    }

    fn timed_out(&self, item: ItemCode) -> SesameError {
        let still_waiting = lock(&self.shared.router).pending(item);
        tracing::warn!(still_waiting, "Timed out waiting for {}", item);
        SesameError::Timeout { item }
    }

    /// Stops the receive task and disconnects the link.
    pub async fn disconnect(mut self) -> SesameResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::debug!("Sending shutdown signal to receive task");
        }
        if let Some(handle) = self.receiver.take() {
            handle.await?;
        }
        self.link.disconnect().await
    }
}

impl<L: GattLink> Drop for SesameClient<L> {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::debug!("Sending shutdown signal to receive task on drop");
        }
    }
}

fn expect_success(response: &Packet) -> SesameResult<()> {
    match response.result() {
        Some(result) if result.is_success() => Ok(()),
        Some(result) => Err(SesameError::Rejected {
            item: response.item,
            result,
        }),
        None => Err(SesameError::UnexpectedResponse(format!(
            "{} response without result code",
            response.item
        ))),
    }
}
