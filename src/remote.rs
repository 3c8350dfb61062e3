//! Remote-control keys and the terminal input that stands in for the remote.
//!
//! Each line read from stdin is one key press: `0`-`9`, `left`, `right`,
//! `space`/`info`, `pair`, `quit`.

use crate::receiver::AppEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKey {
    /// Number key `0`-`9`
    Digit(u8),
    Left,
    Right,
    /// Toggles the info overlay
    Info,
    /// Re-enters pairing mode with a new code
    Pair,
    Quit,
}

impl RemoteKey {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_ascii_lowercase();
        match input.as_str() {
            "left" | "l" | "dpad_left" => Some(RemoteKey::Left),
            "right" | "r" | "dpad_right" => Some(RemoteKey::Right),
            "space" | "info" | "i" => Some(RemoteKey::Info),
            "pair" | "qr" | "p" => Some(RemoteKey::Pair),
            "quit" | "q" | "exit" => Some(RemoteKey::Quit),
            digit if digit.len() == 1 => digit
                .chars()
                .next()
                .and_then(|c| c.to_digit(10))
                .map(|d| RemoteKey::Digit(d as u8)),
            _ => None,
        }
    }

    /// Registry index selected by a number key: `1`-`9` map to 0-8, `0` maps to 9.
    pub fn digit_index(self) -> Option<usize> {
        match self {
            RemoteKey::Digit(0) => Some(9),
            RemoteKey::Digit(d @ 1..=9) => Some(d as usize - 1),
            _ => None,
        }
    }
}

/// Reads key presses from stdin until EOF or cancellation.
pub fn spawn_terminal_remote(
    events: mpsc::Sender<AppEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("Remote ready: 0-9, left, right, info, pair, quit");

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => match RemoteKey::parse(&line) {
                    Some(key) => {
                        debug!("Remote key {:?}", key);
                        if events.send(AppEvent::Key(key)).await.is_err() {
                            break;
                        }
                    }
                    None => warn!("Unknown remote key '{}'", line.trim()),
                },
                Ok(None) => {
                    debug!("Terminal input closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read terminal input: {}", e);
                    break;
                }
            }
        }
    })
}
