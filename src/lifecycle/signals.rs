//! Shutdown signal sources.
//!
//! # Responsibilities
//! - Name the process signals that request shutdown
//! - Deliver them to the coordinator as a stream of events
//! - Let tests inject signals without touching the OS
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Registration happens in `listen`, after all components are scheduled
//! - A source that ends (`recv` returns `None`) never triggers shutdown

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A signal that requests shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// SIGINT / Ctrl+C
    Interrupt,
}

impl Signal {
    /// The default shutdown set.
    pub const DEFAULT: [Signal; 3] = [Signal::Terminate, Signal::Quit, Signal::Interrupt];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::Quit => write!(f, "SIGQUIT"),
            Signal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terminate" | "term" | "sigterm" => Ok(Signal::Terminate),
            "quit" | "sigquit" => Ok(Signal::Quit),
            "interrupt" | "int" | "sigint" => Ok(Signal::Interrupt),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

/// A stream of shutdown requests.
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// Start listening. Called once, before the first `recv`.
    fn listen(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Wait for the next signal. `None` means none will ever arrive.
    async fn recv(&mut self) -> Option<Signal>;
}

/// Process signals delivered by the operating system.
pub struct OsSignals {
    signals: Vec<Signal>,
    #[cfg(unix)]
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
}

impl OsSignals {
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut unique: Vec<Signal> = Vec::new();
        for signal in signals {
            if !unique.contains(&signal) {
                unique.push(signal);
            }
        }
        Self {
            signals: unique,
            #[cfg(unix)]
            streams: Vec::new(),
        }
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }
}

impl Default for OsSignals {
    fn default() -> Self {
        Self::new(Signal::DEFAULT)
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for OsSignals {
    fn listen(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        self.streams.clear();
        for &sig in &self.signals {
            let kind = match sig {
                Signal::Terminate => SignalKind::terminate(),
                Signal::Quit => SignalKind::quit(),
                Signal::Interrupt => SignalKind::interrupt(),
            };
            self.streams.push((sig, signal(kind)?));
        }
        tracing::debug!(signals = ?self.signals, "Subscribed to process signals");
        Ok(())
    }

    async fn recv(&mut self) -> Option<Signal> {
        loop {
            if self.streams.is_empty() {
                return None;
            }
            let pending = self
                .streams
                .iter_mut()
                .map(|(sig, stream)| {
                    let sig = *sig;
                    Box::pin(async move { stream.recv().await.map(|_| sig) })
                })
                .collect::<Vec<_>>();
            let (received, index, _) = futures_util::future::select_all(pending).await;
            match received {
                Some(sig) => return Some(sig),
                None => {
                    self.streams.remove(index);
                }
            }
        }
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        if !self.signals.contains(&Signal::Interrupt) {
            return None;
        }
        tokio::signal::ctrl_c().await.ok().map(|_| Signal::Interrupt)
    }
}

/// Signals injected programmatically through a [`SignalSender`].
pub struct ChannelSignals {
    rx: mpsc::UnboundedReceiver<Signal>,
}

/// Sending half of [`ChannelSignals`].
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl ChannelSignals {
    pub fn new() -> (SignalSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SignalSender { tx }, Self { rx })
    }
}

impl SignalSender {
    /// Deliver `signal`. Returns false once the source has been dropped.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

#[async_trait]
impl SignalSource for ChannelSignals {
    async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_names() {
        assert_eq!("SIGTERM".parse::<Signal>().unwrap(), Signal::Terminate);
        assert_eq!("quit".parse::<Signal>().unwrap(), Signal::Quit);
        assert_eq!("int".parse::<Signal>().unwrap(), Signal::Interrupt);
        assert!("hup".parse::<Signal>().is_err());
    }

    #[test]
    fn test_os_signals_deduplicate() {
        let signals = OsSignals::new([Signal::Interrupt, Signal::Interrupt, Signal::Quit]);
        assert_eq!(signals.signals(), &[Signal::Interrupt, Signal::Quit]);
    }

    #[test]
    fn test_signal_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            signals: Vec<Signal>,
        }
        let parsed: Wrapper = toml::from_str(r#"signals = ["terminate", "interrupt"]"#).unwrap();
        assert_eq!(parsed.signals, vec![Signal::Terminate, Signal::Interrupt]);
    }

    #[tokio::test]
    async fn test_channel_signals() {
        let (sender, mut source) = ChannelSignals::new();
        assert!(sender.send(Signal::Quit));
        assert_eq!(source.recv().await, Some(Signal::Quit));

        drop(sender);
        assert_eq!(source.recv().await, None);
    }
}
