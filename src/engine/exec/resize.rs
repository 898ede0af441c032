//! Notifications that the local terminal changed size.

use std::io;
#[cfg(not(unix))]
use std::time::Duration;

use super::terminal::LocalTerminal;
use crate::engine::{FALLBACK_GEOMETRY, TerminalGeometry};

/// How often the terminal size is sampled where no resize signal exists.
#[cfg(not(unix))]
const RESIZE_POLL_INTERVAL_MS: u64 = 250;

/// Yields the geometry to forward whenever the local terminal is resized.
///
/// On Unix this fires once immediately and then on every `SIGWINCH`.
/// Elsewhere the size is sampled periodically and only changes are reported.
/// A disabled watcher never fires.
#[derive(Debug)]
pub(super) struct ResizeNotifications {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    pending_initial: bool,
    #[cfg(not(unix))]
    ticker: Option<tokio::time::Interval>,
    #[cfg(not(unix))]
    last: Option<TerminalGeometry>,
}

fn current_geometry<T: LocalTerminal + ?Sized>(terminal: &T) -> TerminalGeometry {
    terminal.size().unwrap_or(FALLBACK_GEOMETRY)
}

impl ResizeNotifications {
    /// A watcher that never fires.
    pub(super) const fn disabled() -> Self {
        Self {
            #[cfg(unix)]
            signal: None,
            #[cfg(unix)]
            pending_initial: false,
            #[cfg(not(unix))]
            ticker: None,
            #[cfg(not(unix))]
            last: None,
        }
    }

    /// Start watching for resizes.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from installing the `SIGWINCH` handler.
    #[cfg(unix)]
    pub(super) fn watch() -> io::Result<Self> {
        let signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())?;
        Ok(Self {
            signal: Some(signal),
            pending_initial: true,
        })
    }

    /// Start watching for resizes.
    ///
    /// # Errors
    ///
    /// Never fails on this platform.
    #[cfg(not(unix))]
    pub(super) fn watch() -> io::Result<Self> {
        let mut ticker = tokio::time::interval(Duration::from_millis(RESIZE_POLL_INTERVAL_MS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Ok(Self {
            ticker: Some(ticker),
            last: None,
        })
    }

    /// Wait for the next geometry to forward.
    #[cfg(unix)]
    pub(super) async fn changed<T: LocalTerminal + ?Sized>(
        &mut self,
        terminal: &T,
    ) -> TerminalGeometry {
        if self.pending_initial {
            self.pending_initial = false;
        } else if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_none() {
                self.signal = None;
                std::future::pending::<()>().await;
            }
        } else {
            std::future::pending::<()>().await;
        }
        current_geometry(terminal)
    }

    /// Wait for the next geometry to forward.
    #[cfg(not(unix))]
    pub(super) async fn changed<T: LocalTerminal + ?Sized>(
        &mut self,
        terminal: &T,
    ) -> TerminalGeometry {
        let Some(ticker) = self.ticker.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            ticker.tick().await;
            let geometry = current_geometry(terminal);
            if self.last != Some(geometry) {
                self.last = Some(geometry);
                return geometry;
            }
        }
    }
}
