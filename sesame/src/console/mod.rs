// sesame-os3/sesame/src/console/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Interactive line console on top of a connected [`SesameClient`].
//!
//! The console reads commands from any [`AsyncBufRead`] and writes to any
//! [`AsyncWrite`], so the binary runs it on stdin/stdout and tests run it
//! on in-memory buffers. Mech status publications from the lock are
//! printed between commands as they arrive.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::broadcast::{self, error::RecvError};

use sesame_proto::Event;

use crate::client::SesameClient;
use crate::error::{Result as SesameResult, SesameError};
use crate::transport::GattLink;

mod commands;

use commands::ConsoleCommand;

pub const PROMPT: &str = "command? ";

enum Input {
    Line(Option<String>),
    Event(Result<Event, RecvError>),
}

pub struct Console<'a, L: GattLink, R, W> {
    client: &'a SesameClient<L>,
    lines: Lines<R>,
    output: W,
    events: broadcast::Receiver<Event>,
    display_name: String,
}

impl<'a, L, R, W> Console<'a, L, R, W>
where
    L: GattLink,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// `display_name` is used when `lock`/`unlock` get an empty name.
    pub fn new(client: &'a SesameClient<L>, input: R, output: W, display_name: &str) -> Self {
        Self {
            client,
            lines: input.lines(),
            output,
            events: client.subscribe(),
            display_name: display_name.to_string(),
        }
    }

    /// Runs until `q`, `quit` or end of input. The caller owns the client
    /// and disconnects it afterwards.
    pub async fn run(&mut self) -> SesameResult<()> {
        self.say("Connected. Type 'help' for commands.").await?;
        loop {
            self.write(PROMPT).await?;
            let input = tokio::select! {
                biased;
                event = self.events.recv() => Input::Event(event),
                line = self.lines.next_line() => Input::Line(line?),
            };

            let line = match input {
                Input::Event(event) => {
                    self.on_event(event).await?;
                    continue;
                }
                Input::Line(None) => {
                    tracing::debug!("Console input closed");
                    return Ok(());
                }
                Input::Line(Some(line)) => line,
            };

            let command = match commands::parse(&line) {
                Ok(ConsoleCommand::Quit) => return Ok(()),
                Ok(command) => command,
                Err(message) => {
                    self.say(&message).await?;
                    continue;
                }
            };

            match self.dispatch(command).await {
                Ok(()) => {}
                Err(SesameError::NotConnected) => {
                    self.say("Disconnected from the lock").await?;
                    return Ok(());
                }
                Err(e) => self.say(&format!("Error: {}", e)).await?,
            }
        }
    }

    async fn on_event(&mut self, event: Result<Event, RecvError>) -> SesameResult<()> {
        match event {
            Ok(Event::MechStatus { status }) => {
                let message = format!(
                    "Mech status received: battery {}, is_locked: {}, stop: {}",
                    status.battery, status.lock_range, status.stop
                );
                self.say(&message).await
            }
            Ok(_) => Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Console skipped {} events", skipped);
                Ok(())
            }
            Err(RecvError::Closed) => Err(SesameError::NotConnected),
        }
    }

    /// Prints `question` and reads one trimmed line; `None` at end of input.
    async fn ask(&mut self, question: &str) -> SesameResult<Option<String>> {
        self.write(question).await?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }

    async fn write(&mut self, text: &str) -> SesameResult<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    async fn say(&mut self, line: &str) -> SesameResult<()> {
        self.write(line).await?;
        self.write("\n").await
    }
}
