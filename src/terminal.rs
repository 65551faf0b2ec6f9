//! Terminal access for the render loop.
//!
//! [`TerminalScreen`] hides the cursor and turns off autowrap when created,
//! switches input to raw mode on the first key poll, and undoes all of it in
//! [`Screen::restore`]. `Drop` calls `restore` too, so an early return or a
//! panic still leaves the terminal usable.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, DisableLineWrap, EnableLineWrap};
use crossterm::ExecutableCommand;
use tracing::debug;

const FALLBACK_SIZE: (u16, u16) = (80, 24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Key,
    /// Ctrl-C. Raw mode swallows SIGINT, so it arrives as a key.
    Interrupt,
}

pub trait Screen {
    /// Columns and rows.
    fn size(&mut self) -> Result<(u16, u16)>;

    /// Write `bytes` in one call and flush.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()>;

    /// Non-blocking; `None` when no key is pending.
    fn poll_key(&mut self) -> Result<Option<KeyPress>>;

    /// Put the terminal back the way it was. Safe to call more than once.
    fn restore(&mut self) -> Result<()>;
}

/// Raw input mode, held from the first key poll until restore.
#[derive(Debug, Default)]
struct RawModeGuard {
    enabled: bool,
    /// Input is not a terminal; key polling is skipped.
    unavailable: bool,
}

impl RawModeGuard {
    /// Whether key input can be read.
    fn acquire(&mut self) -> bool {
        if !self.enabled && !self.unavailable {
            match terminal::enable_raw_mode() {
                Ok(()) => {
                    self.enabled = true;
                    debug!("enabled raw mode");
                }
                Err(error) => {
                    self.unavailable = true;
                    debug!(%error, "raw mode unavailable; key exit disabled");
                }
            }
        }
        self.enabled
    }

    fn release(&mut self) -> Result<()> {
        if self.enabled {
            terminal::disable_raw_mode().context("failed to restore terminal input mode")?;
            self.enabled = false;
            debug!("disabled raw mode");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TerminalScreen {
    out: io::Stdout,
    raw: RawModeGuard,
    cursor_hidden: bool,
    wrap_disabled: bool,
}

impl TerminalScreen {
    pub fn new() -> Result<Self> {
        let mut screen = Self {
            out: io::stdout(),
            raw: RawModeGuard::default(),
            cursor_hidden: false,
            wrap_disabled: false,
        };
        screen.out.execute(Hide).context("failed to hide cursor")?;
        screen.cursor_hidden = true;
        screen
            .out
            .execute(DisableLineWrap)
            .context("failed to disable line wrap")?;
        screen.wrap_disabled = true;
        Ok(screen)
    }
}

impl Screen for TerminalScreen {
    fn size(&mut self) -> Result<(u16, u16)> {
        Ok(terminal::size().unwrap_or_else(|error| {
            debug!(%error, "terminal size unavailable; assuming 80x24");
            FALLBACK_SIZE
        }))
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let mut lock = self.out.lock();
        lock.write_all(bytes).context("failed to write to terminal")?;
        lock.flush().context("failed to flush terminal")
    }

    fn poll_key(&mut self) -> Result<Option<KeyPress>> {
        if !self.raw.acquire() {
            return Ok(None);
        }
        while event::poll(Duration::ZERO).context("failed to poll terminal input")? {
            if let Event::Key(key) = event::read().context("failed to read terminal input")? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let interrupt = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
                return Ok(Some(if interrupt { KeyPress::Interrupt } else { KeyPress::Key }));
            }
        }
        Ok(None)
    }

    fn restore(&mut self) -> Result<()> {
        let raw = self.raw.release();
        if self.wrap_disabled {
            self.out.execute(EnableLineWrap).context("failed to re-enable line wrap")?;
            self.wrap_disabled = false;
        }
        if self.cursor_hidden {
            self.out.execute(Show).context("failed to show cursor")?;
            self.cursor_hidden = false;
        }
        raw
    }
}

impl Drop for TerminalScreen {
    fn drop(&mut self) {
        if let Err(error) = self.restore() {
            tracing::warn!(%error, "failed to restore terminal");
        }
    }
}
