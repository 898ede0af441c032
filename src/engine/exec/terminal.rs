//! The local terminal as seen by an exec session.

use std::io::{self, IsTerminal};

use crate::engine::TerminalGeometry;

/// Local terminal capabilities an interactive session depends on.
pub trait LocalTerminal: Send + Sync {
    /// Whether both stdin and stdout are attached to a terminal.
    fn is_terminal(&self) -> bool;

    /// Current terminal size, or `None` when it cannot be detected.
    fn size(&self) -> Option<TerminalGeometry>;

    /// Switch the terminal into raw mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the mode cannot be changed.
    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Restore the terminal from raw mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the mode cannot be changed.
    fn disable_raw_mode(&self) -> io::Result<()>;
}

/// The controlling terminal of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTerminal;

impl LocalTerminal for SystemTerminal {
    fn is_terminal(&self) -> bool {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }

    fn size(&self) -> Option<TerminalGeometry> {
        let (columns, rows) = crossterm::terminal::size().ok()?;
        Some(TerminalGeometry::new_or_fallback(rows, columns))
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }
}

/// Holds a terminal in raw mode and restores it exactly once.
///
/// Restoration happens on [`restore`](Self::restore) or on drop, whichever
/// comes first, so every exit path of a session leaves the terminal usable.
#[derive(Debug)]
pub struct RawModeGuard<'t, T: LocalTerminal + ?Sized> {
    terminal: &'t T,
    active: bool,
}

impl<'t, T: LocalTerminal + ?Sized> RawModeGuard<'t, T> {
    /// Put `terminal` into raw mode.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from enabling raw mode; nothing is restored then.
    pub fn enable(terminal: &'t T) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        Ok(Self {
            terminal,
            active: true,
        })
    }

    /// Leave raw mode now. Later calls and the drop are no-ops.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(error) = self.terminal.disable_raw_mode() {
            tracing::warn!(error = %error, "failed to restore terminal mode");
        }
    }
}

impl<T: LocalTerminal + ?Sized> Drop for RawModeGuard<'_, T> {
    fn drop(&mut self) {
        self.restore();
    }
}
