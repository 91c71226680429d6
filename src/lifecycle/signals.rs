//! OS signal handling.
//!
//! # Responsibilities
//! - Name the signals a shutdown handler may react to
//! - Install tokio signal streams and wait for the first of them
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - On non-unix targets only `SIGINT` (ctrl-c) is available

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "SIGINT")]
    Interrupt,
    #[serde(rename = "SIGTERM")]
    Terminate,
    #[serde(rename = "SIGHUP")]
    Hangup,
    #[serde(rename = "SIGQUIT")]
    Quit,
    #[serde(rename = "SIGUSR1")]
    User1,
    #[serde(rename = "SIGUSR2")]
    User2,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(upper.as_str());
        match name {
            "INT" => Ok(Signal::Interrupt),
            "TERM" => Ok(Signal::Terminate),
            "HUP" => Ok(Signal::Hangup),
            "QUIT" => Ok(Signal::Quit),
            "USR1" => Ok(Signal::User1),
            "USR2" => Ok(Signal::User2),
            _ => Err(format!("unsupported signal '{}'", s)),
        }
    }
}

/// Installed signal streams.
pub struct SignalListener {
    #[cfg(unix)]
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
    #[cfg(not(unix))]
    interrupt: bool,
}

impl SignalListener {
    /// Install handlers for `signals`. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn install(signals: &[Signal]) -> io::Result<Self> {
        let mut streams: Vec<(Signal, tokio::signal::unix::Signal)> = Vec::with_capacity(signals.len());
        for signal in signals {
            if streams.iter().any(|(s, _)| s == signal) {
                continue;
            }
            streams.push((*signal, tokio::signal::unix::signal(signal.kind())?));
        }
        Ok(Self { streams })
    }

    #[cfg(not(unix))]
    pub fn install(signals: &[Signal]) -> io::Result<Self> {
        if let Some(other) = signals.iter().find(|s| **s != Signal::Interrupt) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} is not available on this platform", other),
            ));
        }
        Ok(Self {
            interrupt: !signals.is_empty(),
        })
    }

    /// Wait for the next signal. Returns `None` when nothing is installed.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Option<Signal> {
        if self.streams.is_empty() {
            return None;
        }
        let waits = self.streams.iter_mut().map(|(signal, stream)| {
            let signal = *signal;
            Box::pin(async move { stream.recv().await.map(|_| signal) })
        });
        let (received, _, _) = futures_util::future::select_all(waits).await;
        received
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Option<Signal> {
        if !self.interrupt {
            return None;
        }
        tokio::signal::ctrl_c().await.ok().map(|_| Signal::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_names() {
        assert_eq!("SIGINT".parse::<Signal>().unwrap(), Signal::Interrupt);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Terminate);
        assert_eq!("SIGUSR2".parse::<Signal>().unwrap(), Signal::User2);
        assert!("SIGKILL".parse::<Signal>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Signal::Hangup).unwrap();
        assert_eq!(json, "\"SIGHUP\"");
        let back: Signal = serde_json::from_str("\"SIGQUIT\"").unwrap();
        assert_eq!(back, Signal::Quit);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_listener_returns_none() {
        let mut listener = SignalListener::install(&[]).unwrap();
        assert_eq!(listener.recv().await, None);
    }
}
