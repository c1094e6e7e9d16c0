// sesame-os3/sesame/src/log/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use time::OffsetDateTime;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

use crate::config::SesameConfig;
use crate::error::{Result as SesameResult, SesameError};

const LOG_FILE_NAME: &str = "sesame.log";

/// Crates whose events follow `[log] level`.
const OWN_TARGETS: [&str; 2] = ["sesame", "sesame_proto"];

type SharedBuffer = Arc<Mutex<VecDeque<String>>>;

/// In-memory ring buffer read by the console `log` command.
static LOG_BUFFER: OnceLock<SharedBuffer> = OnceLock::new();

/// Initializes the global tracing subscriber.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the lifetime of the program.
pub fn init(config: &SesameConfig) -> SesameResult<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let tracing_cfg = &config.log;
    let mut file_guard = None;

    let env_filter = build_filter(tracing_cfg)?;

    let mut layers = Vec::new();

    // 1. File layer
    if tracing_cfg.file {
        fs::create_dir_all(&config.log_dir)
            .map_err(|e| SesameError::io_with_path(config.log_dir.clone(), e))?;

        let file_appender = tracing_appender::rolling::never(&config.log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = if tracing_cfg.structured {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
        file_guard = Some(guard);
    }

    // 2. StdErr layer
    if tracing_cfg.stderr {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .boxed();
        layers.push(console_layer);
    }

    // 3. In-memory layer
    if tracing_cfg.buffer_size > 0 {
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(tracing_cfg.buffer_size)));
        LOG_BUFFER
            .set(buffer.clone())
            .map_err(|_| SesameError::Internal("LOG_BUFFER already set".into()))?;
        layers.push(BufferLayer::new(buffer, tracing_cfg.buffer_size).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| SesameError::Internal(format!("failed to init tracing: {}", e)))?;

    Ok(file_guard)
}

/// `RUST_LOG`, when set, replaces the configured directives.
fn build_filter(tracing_cfg: &TracingConfig) -> SesameResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = filter_directives(tracing_cfg);
    EnvFilter::try_new(directives)
        .map_err(|e| SesameError::Config(format!("invalid log filter: {}", e)))
}

fn filter_directives(tracing_cfg: &TracingConfig) -> String {
    let mut directives: Vec<String> = OWN_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, tracing_cfg.default_level))
        .collect();

    let mut modules: Vec<_> = tracing_cfg.modules.iter().collect();
    modules.sort_by(|a, b| a.0.cmp(b.0));
    for (target, level) in modules {
        directives.push(format!("{}={}", target, level));
    }

    directives.join(",")
}

/// Helper: deserialize LevelFilter from string (e.g., "info", "debug")
fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<LevelFilter>().map_err(serde::de::Error::custom)
}

fn deserialize_module_levels<'de, D>(deserializer: D) -> Result<HashMap<String, LevelFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, String> = Deserialize::deserialize(deserializer)?;
    let mut result = HashMap::new();
    for (target, level_str) in map {
        let level = level_str
            .parse::<LevelFilter>()
            .map_err(serde::de::Error::custom)?;
        result.insert(target, level);
    }
    Ok(result)
}

/// The `[log]` section of `sesame.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct TracingConfig {
    #[serde(
        rename = "level",
        default = "default_log_level",
        deserialize_with = "deserialize_level_filter"
    )]
    pub default_level: LevelFilter,

    /// JSON lines in the log file.
    #[serde(default)]
    pub structured: bool,

    #[serde(default = "default_stderr")]
    pub stderr: bool,

    #[serde(default)]
    pub file: bool,

    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default, deserialize_with = "deserialize_module_levels")]
    pub modules: HashMap<String, LevelFilter>,
}

fn default_log_level() -> LevelFilter { LevelFilter::INFO }
fn default_stderr() -> bool { true }
fn default_buffer_size() -> usize { 100 }

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: default_log_level(),
            structured: false,
            stderr: default_stderr(),
            file: false,
            dir: None,
            buffer_size: default_buffer_size(),
            modules: HashMap::new(),
        }
    }
}

/// Returns up to `n` recent log lines, most recent first.
pub fn get_recent_logs(n: usize) -> Vec<String> {
    match LOG_BUFFER.get() {
        Some(buffer) => recent_lines(buffer, n),
        None => vec![],
    }
}

fn recent_lines(buffer: &SharedBuffer, n: usize) -> Vec<String> {
    let buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    buf.iter().rev().take(n).cloned().collect()
}

// === Layer for the console ring buffer ===
struct BufferLayer {
    buffer: SharedBuffer,
    max_size: usize,
}

impl BufferLayer {
    fn new(buffer: SharedBuffer, max_size: usize) -> Self {
        Self { buffer, max_size }
    }
}

impl<S> Layer<S> for BufferLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let meta = event.metadata();

        let now = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "<invalid-timestamp>".to_string());

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let message = if visitor.message.is_empty() {
            "no message".to_string()
        } else {
            visitor.message
        };

        let fields = if visitor.fields.is_empty() {
            String::new()
        } else {
            format!(" {{{}}}", visitor.fields.join(", "))
        };

        let line = format!("{} {} {}: {}{}", now, meta.level(), meta.target(), message, fields);

        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if buf.len() >= self.max_size {
            buf.pop_front();
        }
        buf.push_back(line);
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<String>,
}

impl tracing::field::Visit for EventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}
