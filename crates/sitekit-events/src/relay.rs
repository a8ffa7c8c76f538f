//! Relay channel transports
//!
//! The relay moves allowlisted events between a parent and a single linked
//! child process as newline-delimited JSON. Parent-to-child lines travel over
//! the child's piped stdin; child-to-parent lines are ordinary stdout lines
//! prefixed with [`IPC_SENTINEL`] so the parent's stdout tap can tell them
//! apart from regular program output.

use std::io::{self, Write};

use tokio::sync::mpsc;

/// Prefix marking a stdout line as a relayed event rather than program output.
pub const IPC_SENTINEL: &str = "@sitekit-ipc:";

/// One-way transport for encoded event lines.
pub trait RelayChannel: Send + Sync {
    /// Deliver one encoded event line to the peer.
    fn send_line(&self, line: &str) -> io::Result<()>;
}

/// Child-side relay: writes sentinel-prefixed lines to stdout for the
/// parent's stdout tap.
#[derive(Debug, Default)]
pub struct StdoutRelay;

impl StdoutRelay {
    fn frame(line: &str, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{IPC_SENTINEL}{line}")?;
        out.flush()
    }
}

impl RelayChannel for StdoutRelay {
    fn send_line(&self, line: &str) -> io::Result<()> {
        StdoutRelay::frame(line, &mut io::stdout().lock())
    }
}

/// Relay backed by an in-memory channel.
///
/// The parent side hands the receiving end to whatever task owns the child's
/// stdin pipe.
#[derive(Debug, Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelRelay {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl RelayChannel for ChannelRelay {
    fn send_line(&self, line: &str) -> io::Result<()> {
        self.tx
            .send(line.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "relay receiver dropped"))
    }
}

/// Strip the IPC sentinel from a stdout line, if present.
pub fn strip_sentinel(line: &str) -> Option<&str> {
    line.strip_prefix(IPC_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sentinel() {
        assert_eq!(
            strip_sentinel(r#"@sitekit-ipc:{"type":"reload-page"}"#),
            Some(r#"{"type":"reload-page"}"#)
        );
        assert_eq!(strip_sentinel("Server started"), None);
    }

    #[test]
    fn test_stdout_relay_frames_lines_for_the_parent_tap() {
        let mut out = Vec::new();
        StdoutRelay::frame(r#"{"type":"reload-page","payload":{}}"#, &mut out).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(
            written,
            "@sitekit-ipc:{\"type\":\"reload-page\",\"payload\":{}}\n"
        );
        // The parent tap must recover exactly the encoded body.
        assert_eq!(
            strip_sentinel(written.trim_end()),
            Some(r#"{"type":"reload-page","payload":{}}"#)
        );
    }

    #[tokio::test]
    async fn test_channel_relay_delivers_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = ChannelRelay::new(tx);
        relay.send_line("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_channel_relay_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let relay = ChannelRelay::new(tx);
        assert!(relay.send_line("hello").is_err());
    }
}
