// sesame-os3/sesame/src/error/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Centralized error handling for the Sesame client.
//!
//! Uses `thiserror` to define structured errors and `anyhow` for convenient propagation.
//! Library modules return `Result<T, SesameError>`; the binary edge uses
//! `anyhow::Result<T>` (re-exported as `AnyResult`).

use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

use sesame_proto::{ItemCode, ProtoError, ResultCode};

/// The root error type for all client failures.
#[derive(Error, Debug)]
pub enum SesameError {
    /// General-purpose error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with associated path for better diagnostics
    #[error("I/O error at {path:?}: {source}")]
    IoWithPath {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration loading or validation error.
    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Malformed device data or a crypto failure.
    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("Not connected")]
    NotConnected,

    /// An encrypted command was attempted before the session was established.
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Timed out waiting for {item} response")]
    Timeout { item: ItemCode },

    /// The lock answered with a non-success result code.
    #[error("Device rejected {item}: {result}")]
    Rejected { item: ItemCode, result: ResultCode },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Task join error.
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
}

impl SesameError {
    /// Creates an `IoWithPath` error from a path and an I/O error.
    pub fn io_with_path<E: Into<std::io::Error>>(path: PathBuf, source: E) -> Self {
        Self::IoWithPath {
            source: source.into(),
            path,
        }
    }
}

/// Convenient alias for `Result<T, SesameError>`.
pub type Result<T> = std::result::Result<T, SesameError>;

pub use anyhow::Result as AnyResult;
