//! Background info-panel refresh.
//!
//! The task owns no terminal state. Each finished template is sent over a
//! channel; the render loop drains it between frames and keeps the newest.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::layout::{LayoutPlan, Template};
use crate::tools::InfoSource;

pub struct RefreshTask {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Re-run `info` every `interval` and publish the rebuilt template on
    /// the returned receiver.
    pub fn spawn(
        info: Arc<dyn InfoSource>,
        plan: LayoutPlan,
        interval: Duration,
    ) -> Result<(Self, Receiver<Template>)> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (template_tx, template_rx) = mpsc::channel::<Template>();
        let worker = thread::Builder::new()
            .name("anifetch-info-refresh".to_owned())
            .spawn(move || run(info.as_ref(), &plan, interval, &stop_rx, &template_tx))
            .context("failed to spawn info refresh thread")?;
        Ok((
            Self {
                stop_tx: Some(stop_tx),
                worker: Some(worker),
            },
            template_rx,
        ))
    }

    /// Signal the task and wait for it to exit.
    pub fn stop(&mut self) -> Result<()> {
        // Dropping the sender wakes the worker out of its timed wait.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("info refresh thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(%error, "info refresh thread did not stop cleanly");
        }
    }
}

fn run(
    info: &dyn InfoSource,
    plan: &LayoutPlan,
    interval: Duration,
    stop_rx: &Receiver<()>,
    template_tx: &Sender<Template>,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        match info.info_lines() {
            Ok(lines) => {
                debug!(lines = lines.len(), "refreshed info panel");
                if template_tx.send(plan.template(&lines)).is_err() {
                    break;
                }
            }
            Err(error) => warn!(%error, "info refresh failed; keeping previous panel"),
        }
    }
}

/// Newest template waiting on `rx`, if any.
pub fn latest(rx: &Receiver<Template>) -> Option<Template> {
    let mut newest = None;
    while let Ok(template) = rx.try_recv() {
        newest = Some(template);
    }
    newest
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    struct Counting(AtomicUsize);

    impl InfoSource for Counting {
        fn info_lines(&self) -> Result<Vec<String>> {
            let call = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("refresh {call}")])
        }
    }

    #[test]
    fn publishes_rebuilt_templates_until_stopped() {
        let info = Arc::new(Counting(AtomicUsize::new(0)));
        let plan = LayoutPlan::new(10, 1, false);
        let (mut task, rx) =
            RefreshTask::spawn(info.clone(), plan, Duration::from_millis(10)).expect("spawn");

        let first = rx.recv_timeout(Duration::from_secs(5)).expect("template");
        assert!(first.lines()[0].ends_with("refresh 0"));

        task.stop().expect("stop");
        let calls = info.0.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(info.0.load(Ordering::SeqCst), calls, "no refresh after stop");
    }

    #[test]
    fn stop_does_not_wait_for_the_interval() {
        let info = Arc::new(Counting(AtomicUsize::new(0)));
        let (mut task, _rx) = RefreshTask::spawn(info, LayoutPlan::new(4, 1, false), Duration::from_secs(60))
            .expect("spawn");
        let started = Instant::now();
        task.stop().expect("stop");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn latest_keeps_only_the_newest() {
        let (tx, rx) = mpsc::channel();
        let plan = LayoutPlan::new(4, 1, false);
        tx.send(plan.template(&["a".to_owned()])).expect("send");
        tx.send(plan.template(&["b".to_owned()])).expect("send");
        let newest = latest(&rx).expect("template");
        assert!(newest.lines()[0].ends_with('b'));
        assert!(latest(&rx).is_none());
    }
}
