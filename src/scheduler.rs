//! Render loop: paces frames, adopts refreshed or resized templates between
//! frames and owns every write to the terminal.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate};
use crossterm::QueueableCommand;
use tracing::{debug, warn};

use crate::config::{LoopCount, RefreshInterval};
use crate::frames::FrameStore;
use crate::layout::{LayoutPlan, Template};
use crate::refresh::{self, RefreshTask};
use crate::terminal::{KeyPress, Screen};
use crate::text::fit_to_width;
use crate::tools::{AudioHandle, Toolbox};

/// A width change is adopted once it has held this long.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    StaticDraw,
    Looping,
    Cancelled,
    Completed,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Time source for pacing.
pub trait Clock {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub fps: f64,
    pub loop_count: LoopCount,
    /// Rows above the drawing.
    pub top: usize,
    /// Any key ends playback. Ctrl-C always does.
    pub key_exit: bool,
    pub refresh: RefreshInterval,
    pub sound: Option<PathBuf>,
    /// Clear the screen on exit instead of leaving the last frame.
    pub cleanup: bool,
}

/// What is currently on screen, plus a width change waiting out the debounce.
struct View {
    template: Template,
    fitted: Vec<String>,
    cols: u16,
    rows: u16,
    pending_cols: Option<(u16, Duration)>,
    needs_full_redraw: bool,
}

impl View {
    fn new(template: Template, (cols, rows): (u16, u16)) -> Self {
        let fitted = template.fit(usize::from(cols));
        Self {
            template,
            fitted,
            cols,
            rows,
            pending_cols: None,
            needs_full_redraw: true,
        }
    }

    fn replace_template(&mut self, template: Template) {
        self.fitted = template.fit(usize::from(self.cols));
        self.template = template;
        self.needs_full_redraw = true;
    }

    fn observe_size(&mut self, (cols, rows): (u16, u16), now: Duration) {
        if rows != self.rows {
            self.rows = rows;
            self.needs_full_redraw = true;
        }
        if cols == self.cols {
            self.pending_cols = None;
            return;
        }
        match self.pending_cols {
            Some((pending, since)) if pending == cols => {
                if now.saturating_sub(since) >= RESIZE_DEBOUNCE {
                    debug!(from = self.cols, to = cols, "terminal width changed");
                    self.cols = cols;
                    self.fitted = self.template.fit(usize::from(cols));
                    self.pending_cols = None;
                    self.needs_full_redraw = true;
                }
            }
            _ => self.pending_cols = Some((cols, now)),
        }
    }

    /// One frame as a single buffer: the template when it changed, then the
    /// animation rows over the reserved column.
    fn compose(&mut self, plan: &LayoutPlan, top: usize, frame: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(frame.len() + 256);
        buf.queue(BeginSynchronizedUpdate)?;
        if self.needs_full_redraw {
            buf.queue(Clear(ClearType::All))?;
            for (index, line) in self.fitted.iter().enumerate() {
                let Some(row) = self.visible_row(top + index) else {
                    break;
                };
                buf.queue(MoveTo(0, row))?.queue(Print(line))?;
            }
            self.needs_full_redraw = false;
        }

        let column_width = plan
            .anim_width
            .min(usize::from(self.cols).saturating_sub(plan.left));
        if column_width > 0 {
            let first_row = top + self.template.anim_row_offset();
            for (index, line) in frame.lines().enumerate() {
                let Some(row) = self.visible_row(first_row + index) else {
                    break;
                };
                buf.queue(MoveTo(plan.left as u16, row))?
                    .queue(Print(fit_to_width(line, column_width)))?;
            }
        }
        buf.queue(EndSynchronizedUpdate)?;
        Ok(buf)
    }

    fn visible_row(&self, row: usize) -> Option<u16> {
        u16::try_from(row).ok().filter(|row| *row < self.rows)
    }
}

pub struct Player<S: Screen, C: Clock> {
    screen: S,
    clock: C,
    plan: LayoutPlan,
    options: PlaybackOptions,
    phase: Phase,
    frames_shown: usize,
}

impl<S: Screen, C: Clock> Player<S, C> {
    pub fn new(screen: S, clock: C, plan: LayoutPlan, options: PlaybackOptions) -> Self {
        Self {
            screen,
            clock,
            plan,
            options,
            phase: Phase::Idle,
            frames_shown: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Frames written to the screen so far, across all loops.
    pub fn frames_shown(&self) -> usize {
        self.frames_shown
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn into_screen(self) -> S {
        self.screen
    }

    /// Play `frames` next to `info_lines` until the loop count is reached or
    /// a key cancels. Audio and the refresh task are stopped and the screen
    /// restored before returning, whatever the result.
    pub fn run(&mut self, frames: &mut FrameStore, info_lines: &[String], tools: &Toolbox) -> Result<Outcome> {
        self.enter(Phase::StaticDraw);
        let size = self.screen.size()?;
        let mut view = View::new(self.plan.template(info_lines), size);

        let mut audio: Option<Box<dyn AudioHandle>> = None;
        let mut refresh_task: Option<RefreshTask> = None;
        let mut updates: Option<Receiver<Template>> = None;

        let result = (|| -> Result<Outcome> {
            let buf = view.compose(&self.plan, self.options.top, "")?;
            self.screen.write_frame(&buf)?;

            if let Some(sound) = self.options.sound.as_deref() {
                audio = Some(tools.audio.play(sound)?);
            }
            if let RefreshInterval::Every(interval) = self.options.refresh {
                let (task, rx) = RefreshTask::spawn(tools.info.clone(), self.plan, interval)?;
                refresh_task = Some(task);
                updates = Some(rx);
            }

            self.enter(Phase::Looping);
            self.play_loop(frames, &mut view, updates.as_ref())
        })();

        self.enter(match result {
            Ok(Outcome::Completed) => Phase::Completed,
            Ok(Outcome::Cancelled) | Err(_) => Phase::Cancelled,
        });
        self.enter(Phase::Teardown);
        let teardown = self.teardown(refresh_task, audio, &view);
        let outcome = result?;
        teardown?;
        Ok(outcome)
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "playback phase");
        self.phase = phase;
    }

    fn play_loop(
        &mut self,
        frames: &mut FrameStore,
        view: &mut View,
        updates: Option<&Receiver<Template>>,
    ) -> Result<Outcome> {
        let total = frames.len();
        if total == 0 {
            return Ok(Outcome::Completed);
        }
        let limit = match self.options.loop_count {
            LoopCount::Infinite => None,
            LoopCount::Times(times) => Some(total.saturating_mul(times as usize)),
        };
        let fps = if self.options.fps > 0.0 { self.options.fps } else { 1.0 };
        let start = self.clock.elapsed();

        let mut index = 0usize;
        loop {
            if limit.is_some_and(|limit| index >= limit) {
                return Ok(Outcome::Completed);
            }
            if let Some(key) = self.screen.poll_key()? {
                if key == KeyPress::Interrupt || self.options.key_exit {
                    debug!(?key, frame = index, "playback cancelled");
                    return Ok(Outcome::Cancelled);
                }
            }

            let target = start + Duration::from_secs_f64(index as f64 / fps);
            let now = self.clock.elapsed();
            if target > now {
                self.clock.sleep(target - now);
            }

            if let Some(template) = updates.and_then(refresh::latest) {
                view.replace_template(template);
            }
            let size = self.screen.size()?;
            view.observe_size(size, self.clock.elapsed());

            let frame = frames.get(index % total)?;
            let buf = view.compose(&self.plan, self.options.top, frame)?;
            self.screen.write_frame(&buf)?;
            self.frames_shown += 1;
            index += 1;
        }
    }

    fn teardown(
        &mut self,
        refresh_task: Option<RefreshTask>,
        audio: Option<Box<dyn AudioHandle>>,
        view: &View,
    ) -> Result<()> {
        if let Some(mut task) = refresh_task {
            if let Err(error) = task.stop() {
                warn!(%error, "failed to stop info refresh");
            }
        }
        if let Some(mut audio) = audio {
            if let Err(error) = audio.terminate() {
                warn!(%error, "failed to stop audio");
            }
        }

        let mut buf = Vec::new();
        if self.options.cleanup {
            buf.queue(Clear(ClearType::All))?.queue(MoveTo(0, 0))?;
        } else {
            let drawn = view.fitted.len().max(self.plan.anim_height + view.template.anim_row_offset());
            let below = (self.options.top + drawn).min(usize::from(view.rows.saturating_sub(1)));
            buf.queue(MoveTo(0, below as u16))?.queue(Print("\r\n"))?;
        }
        let written = self.screen.write_frame(&buf);
        self.screen.restore().context("failed to restore terminal")?;
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(cols: u16) -> View {
        let template = LayoutPlan::new(4, 2, false).template(&["info".to_owned()]);
        View::new(template, (cols, 24))
    }

    #[test]
    fn width_change_waits_for_debounce() {
        let mut view = view(80);
        view.needs_full_redraw = false;

        view.observe_size((60, 24), Duration::from_millis(0));
        assert_eq!(view.cols, 80);
        view.observe_size((60, 24), Duration::from_millis(100));
        assert_eq!(view.cols, 80);
        view.observe_size((60, 24), Duration::from_millis(250));
        assert_eq!(view.cols, 60);
        assert!(view.needs_full_redraw);
    }

    #[test]
    fn bouncing_width_never_refits() {
        let mut view = view(80);
        view.observe_size((60, 24), Duration::from_millis(0));
        view.observe_size((80, 24), Duration::from_millis(150));
        view.observe_size((60, 24), Duration::from_millis(300));
        assert_eq!(view.cols, 80);
        assert_eq!(view.pending_cols, Some((60, Duration::from_millis(300))));
    }

    #[test]
    fn compose_skips_rows_past_the_bottom() {
        let plan = LayoutPlan::new(4, 3, false);
        let template = plan.template(&["info".to_owned()]);
        let mut view = View::new(template, (80, 3));
        let buf = view.compose(&plan, 2, "AAAA\nBBBB\nCCCC\n").expect("compose");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("AAAA"));
        assert!(!text.contains("BBBB"));
        assert!(!text.contains("CCCC"));
    }

    #[test]
    fn compose_clips_animation_to_terminal_width() {
        let plan = LayoutPlan::new(10, 1, false);
        let mut view = View::new(plan.template(&[]), (8, 24));
        let buf = view.compose(&plan, 0, "0123456789").expect("compose");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("0123"));
        assert!(!text.contains("01234"));
    }
}
