//! Audible alert loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dms::{AlertEvent, AlertListener};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{AlertConfig, AlertError};

/// Audio output
pub trait Playback: Send + Sync {
    /// Whether a clip is still playing
    fn is_busy(&self) -> bool;

    /// Start the alert clip from the beginning
    fn play(&self);

    /// Cut playback immediately
    fn stop(&self);
}

/// Playback stand-in: logs each clip and tracks its fixed duration
#[derive(Debug)]
pub struct TonePlayback {
    clip: Duration,
    started: Mutex<Option<Instant>>,
    plays: AtomicU64,
}

impl TonePlayback {
    pub fn new(clip: Duration) -> Self {
        Self {
            clip,
            started: Mutex::new(None),
            plays: AtomicU64::new(0),
        }
    }

    /// Clips started so far
    pub fn plays(&self) -> u64 {
        self.plays.load(Ordering::SeqCst)
    }
}

impl Playback for TonePlayback {
    fn is_busy(&self) -> bool {
        self.started
            .lock()
            .map(|started| started.is_some_and(|t| t.elapsed() < self.clip))
            .unwrap_or(false)
    }

    fn play(&self) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        let n = self.plays.fetch_add(1, Ordering::SeqCst) + 1;
        info!(clip_ms = self.clip.as_millis() as u64, plays = n, "Playing alert tone");
    }

    fn stop(&self) {
        if let Ok(mut started) = self.started.lock() {
            if started.take().is_some() {
                debug!("Alert tone stopped");
            }
        }
    }
}

/// Replays the alert clip for as long as the drowsiness alert is active.
///
/// Each activation spawns a task with its own flag; deactivation clears the
/// flag and stops playback, and the task exits at its next poll. The task
/// holds the flag's lock from check to `play()`, so a clip can never start
/// after deactivation returns.
pub struct AlertLoop {
    player: Arc<dyn Playback>,
    poll_interval: Duration,
    runtime: Handle,
    active: Option<Arc<Mutex<bool>>>,
    task: Option<JoinHandle<()>>,
}

impl AlertLoop {
    /// Must be called from within a tokio runtime
    pub fn new(player: Arc<dyn Playback>, config: &AlertConfig) -> Result<Self, AlertError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| AlertError::Runtime(e.to_string()))?;
        Ok(Self {
            player,
            poll_interval: config.poll_interval(),
            runtime,
            active: None,
            task: None,
        })
    }

    /// Whether the polling task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn start(&mut self) {
        self.halt();

        let active = Arc::new(Mutex::new(true));
        let flag = active.clone();
        let player = self.player.clone();
        let period = self.poll_interval;

        self.task = Some(self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let still_active = {
                    let active = lock(&flag);
                    if *active && !player.is_busy() {
                        player.play();
                    }
                    *active
                };
                if !still_active {
                    break;
                }
            }
            debug!("Alert loop exited");
        }));
        self.active = Some(active);
    }

    fn halt(&mut self) {
        if let Some(active) = self.active.take() {
            let mut active = lock(&active);
            *active = false;
            self.player.stop();
        }
    }
}

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AlertListener for AlertLoop {
    fn on_alert_activated(&mut self, event: &AlertEvent) {
        debug!(episode = event.episode, "Starting alert loop");
        self.start();
    }

    fn on_alert_deactivated(&mut self, event: &AlertEvent) {
        debug!(episode = event.episode, "Stopping alert loop");
        self.halt();
    }
}

impl Drop for AlertLoop {
    fn drop(&mut self) {
        self.halt();
    }
}
