// sesame-os3/sesame/src/console/commands.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Console command parsing and dispatch.

use tokio::io::{AsyncBufRead, AsyncWrite};

use sesame_proto::HistoryRead;

use super::Console;
use crate::error::Result as SesameResult;
use crate::log;
use crate::transport::GattLink;

const DEFAULT_LOG_LINES: usize = 10;

const HELP: &str = "\
Commands:
  lock [NAME]          lock, recording NAME in the history
  unlock [NAME]        unlock, recording NAME in the history
  custom               send a raw command (item code and hex payload)
  hist peek            show the oldest history entry without removing it
  hist pop             show and remove the oldest history entry
  hist delete ID       delete history entry ID
  autolock SECONDS     set the auto lock delay (0 disables it)
  version              show the firmware version
  status               show the last mech status and settings
  log [N]              show the last N log lines
  help                 show this help
  q, quit              disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ConsoleCommand {
    Empty,
    Lock(Option<String>),
    Unlock(Option<String>),
    Custom,
    History(HistoryRead),
    HistoryDelete(u32),
    Autolock(u16),
    Version,
    Status,
    Log(usize),
    Help,
    Quit,
}

/// Parses one console line. The error is the message shown to the user.
pub(super) fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let name = || (!rest.is_empty()).then(|| rest.to_string());

    match word {
        "" => Ok(ConsoleCommand::Empty),
        "lock" => Ok(ConsoleCommand::Lock(name())),
        "unlock" => Ok(ConsoleCommand::Unlock(name())),
        "custom" => Ok(ConsoleCommand::Custom),
        "hist" | "history" => parse_history(rest),
        "autolock" => rest
            .parse()
            .map(ConsoleCommand::Autolock)
            .map_err(|_| format!("Usage: autolock SECONDS (0-{})", u16::MAX)),
        "version" => Ok(ConsoleCommand::Version),
        "status" => Ok(ConsoleCommand::Status),
        "log" if rest.is_empty() => Ok(ConsoleCommand::Log(DEFAULT_LOG_LINES)),
        "log" => rest
            .parse()
            .map(ConsoleCommand::Log)
            .map_err(|_| "Usage: log [N]".to_string()),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "q" | "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("Unknown command: {} (type 'help')", other)),
    }
}

fn parse_history(rest: &str) -> Result<ConsoleCommand, String> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next()) {
        (Some("peek"), None) => Ok(ConsoleCommand::History(HistoryRead::Peek)),
        (Some("pop"), None) => Ok(ConsoleCommand::History(HistoryRead::Pop)),
        (Some("delete"), Some(id)) => id
            .parse()
            .map(ConsoleCommand::HistoryDelete)
            .map_err(|_| format!("Invalid history id: {}", id)),
        _ => Err("Usage: hist peek | hist pop | hist delete ID".to_string()),
    }
}

impl<'a, L, R, W> Console<'a, L, R, W>
where
    L: GattLink,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(super) async fn dispatch(&mut self, command: ConsoleCommand) -> SesameResult<()> {
        match command {
            ConsoleCommand::Empty | ConsoleCommand::Quit => Ok(()),
            ConsoleCommand::Lock(name) => {
                let name = self.display_name_or_ask(name).await?;
                self.client.lock(&name).await?;
                self.say("Locked").await
            }
            ConsoleCommand::Unlock(name) => {
                let name = self.display_name_or_ask(name).await?;
                self.client.unlock(&name).await?;
                self.say("Unlocked").await
            }
            ConsoleCommand::Custom => self.handle_custom().await,
            ConsoleCommand::History(read) => match self.client.history(read).await? {
                Some(record) => self.say(&record.to_string()).await,
                None => self.say("History is empty").await,
            },
            ConsoleCommand::HistoryDelete(id) => {
                self.client.delete_history(id).await?;
                self.say(&format!("History entry {} deleted", id)).await
            }
            ConsoleCommand::Autolock(seconds) => {
                self.client.set_autolock_time(seconds).await?;
                self.say(&format!("Auto lock set to {}s", seconds)).await
            }
            ConsoleCommand::Version => {
                let version = self.client.version().await?;
                self.say(&format!("Version: {}", version)).await
            }
            ConsoleCommand::Status => self.handle_status().await,
            ConsoleCommand::Log(n) => {
                let lines = log::get_recent_logs(n);
                if lines.is_empty() {
                    return self.say("No log lines buffered").await;
                }
                for line in lines {
                    self.say(&line).await?;
                }
                Ok(())
            }
            ConsoleCommand::Help => self.say(HELP).await,
        }
    }

    async fn display_name_or_ask(&mut self, name: Option<String>) -> SesameResult<String> {
        let name = match name {
            Some(name) => name,
            None => self.ask("display name? ").await?.unwrap_or_default(),
        };
        if name.is_empty() {
            Ok(self.display_name.clone())
        } else {
            Ok(name)
        }
    }

    async fn handle_custom(&mut self) -> SesameResult<()> {
        let Some(item) = self.ask("item code? ").await? else {
            return Ok(());
        };
        let item: u8 = match item.parse() {
            Ok(item) => item,
            Err(_) => return self.say(&format!("Invalid item code: {}", item)).await,
        };
        let payload = self.ask("payload (hex)? ").await?.unwrap_or_default();
        let payload = match hex::decode(payload.replace(' ', "")) {
            Ok(payload) => payload,
            Err(e) => return self.say(&format!("Invalid payload: {}", e)).await,
        };

        let response = self.client.send_raw(item, payload).await?;
        let message = format!(
            "Response: op {:?}, item {}, payload {}",
            response.op,
            response.item,
            hex::encode(&response.payload)
        );
        self.say(&message).await
    }

    async fn handle_status(&mut self) -> SesameResult<()> {
        let state = self.client.state();
        let status = match state.mech_status {
            Some(status) => status.to_string(),
            None => "unknown".to_string(),
        };
        let settings = match state.mech_settings {
            Some(settings) => settings.to_string(),
            None => "unknown".to_string(),
        };
        self.say(&format!("Mech status: {}", status)).await?;
        self.say(&format!("Mech settings: {}", settings)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_lock_with_and_without_name() {
        assert_eq!(parse("lock"), Ok(ConsoleCommand::Lock(None)));
        assert_eq!(
            parse("  unlock  front door "),
            Ok(ConsoleCommand::Unlock(Some("front door".to_string())))
        );
    }

    #[test]
    fn test_parses_history_subcommands() {
        assert_eq!(parse("hist peek"), Ok(ConsoleCommand::History(HistoryRead::Peek)));
        assert_eq!(parse("hist pop"), Ok(ConsoleCommand::History(HistoryRead::Pop)));
        assert_eq!(parse("hist delete 42"), Ok(ConsoleCommand::HistoryDelete(42)));
        assert!(parse("hist delete abc").is_err());
        assert!(parse("hist").is_err());
    }

    #[test]
    fn test_parses_numeric_arguments() {
        assert_eq!(parse("autolock 30"), Ok(ConsoleCommand::Autolock(30)));
        assert!(parse("autolock 70000").is_err());
        assert_eq!(parse("log"), Ok(ConsoleCommand::Log(DEFAULT_LOG_LINES)));
        assert_eq!(parse("log 3"), Ok(ConsoleCommand::Log(3)));
    }

    #[test]
    fn test_quit_and_unknown() {
        assert_eq!(parse("q"), Ok(ConsoleCommand::Quit));
        assert_eq!(parse("quit"), Ok(ConsoleCommand::Quit));
        assert_eq!(parse(""), Ok(ConsoleCommand::Empty));
        let err = parse("open sesame").unwrap_err();
        assert!(err.contains("Unknown command: open"));
    }
}
