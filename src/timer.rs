use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// The deadlines the detection core schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Ends the motion dead-time after a trigger
    MotionCooldown,
    /// Clears presence after a stretch without detections
    PresenceAbsence,
    /// Periodic activity ping while someone is present
    KeepAlive,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::MotionCooldown => "motion_cooldown",
            TimerKind::PresenceAbsence => "presence_absence",
            TimerKind::KeepAlive => "keep_alive",
        };
        f.write_str(name)
    }
}

/// Delivered to the owner's inbox when a timer elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

/// One-shot or repeating deadline that posts into an mpsc inbox.
///
/// Every schedule or cancel bumps the generation, so a fire that was already
/// queued when the timer was re-armed or cancelled fails [`claim`] and must be
/// ignored by the owner.
///
/// [`claim`]: CancellableTimer::claim
pub struct CancellableTimer<M> {
    kind: TimerKind,
    sender: mpsc::UnboundedSender<M>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
    repeating: bool,
}

impl<M> CancellableTimer<M>
where
    M: From<TimerFired> + Send + 'static,
{
    pub fn new(kind: TimerKind, sender: mpsc::UnboundedSender<M>) -> Self {
        Self {
            kind,
            sender,
            handle: None,
            generation: 0,
            repeating: false,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arm a single fire after `delay`, replacing any pending deadline
    pub fn schedule_once(&mut self, delay: Duration) {
        self.cancel();
        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let sender = self.sender.clone();
        let deadline = Instant::now() + delay;

        self.handle = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            trace!("Timer {} elapsed (generation {})", fired.kind, fired.generation);
            let _ = sender.send(M::from(fired));
        }));
        self.repeating = false;
        debug!("Armed {} timer for {:?}", self.kind, delay);
    }

    /// Arm a periodic fire every `period`, first one after one full period
    pub fn schedule_repeating(&mut self, period: Duration) {
        self.cancel();
        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let sender = self.sender.clone();
        let first = Instant::now() + period;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!("Timer {} ticked (generation {})", fired.kind, fired.generation);
                if sender.send(M::from(fired)).is_err() {
                    break;
                }
            }
        }));
        self.repeating = true;
        debug!("Armed repeating {} timer every {:?}", self.kind, period);
    }

    /// Disarm the timer; returns whether a deadline was pending
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                if was_pending {
                    debug!("Cancelled {} timer", self.kind);
                }
                was_pending
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Validate a fire taken from the inbox. A one-shot timer disarms itself
    /// on a successful claim.
    pub fn claim(&mut self, fired: &TimerFired) -> bool {
        if fired.kind != self.kind || fired.generation != self.generation || self.handle.is_none()
        {
            trace!(
                "Ignoring stale {} fire (generation {}, current {})",
                fired.kind,
                fired.generation,
                self.generation
            );
            return false;
        }

        if !self.repeating {
            self.handle = None;
        }
        true
    }
}

impl<M> Drop for CancellableTimer<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(kind: TimerKind) -> (CancellableTimer<TimerFired>, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CancellableTimer::new(kind, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_after_delay() {
        let (mut timer, mut rx) = timer(TimerKind::MotionCooldown);
        timer.schedule_once(Duration::from_secs(2));
        assert!(timer.is_armed());

        time::advance(Duration::from_millis(1999)).await;
        assert!(rx.try_recv().is_err());

        time::advance(Duration::from_millis(1)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::MotionCooldown);
        assert!(timer.claim(&fired));
        assert!(!timer.is_armed());
        assert!(!timer.claim(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_queued_fire() {
        let (mut timer, mut rx) = timer(TimerKind::PresenceAbsence);
        timer.schedule_once(Duration::from_secs(1));
        time::advance(Duration::from_secs(1)).await;
        let stale = rx.recv().await.unwrap();

        timer.schedule_once(Duration::from_secs(10));
        assert!(!timer.claim(&stale));
        assert!(timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (mut timer, mut rx) = timer(TimerKind::PresenceAbsence);
        timer.schedule_once(Duration::from_secs(10));
        assert!(timer.cancel());
        assert!(!timer.is_armed());

        time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_timer_ticks_until_cancelled() {
        let (mut timer, mut rx) = timer(TimerKind::KeepAlive);
        timer.schedule_repeating(Duration::from_secs(5));

        for _ in 0..3 {
            let fired = rx.recv().await.unwrap();
            assert!(timer.claim(&fired));
            assert!(timer.is_armed());
        }

        timer.cancel();
        time::advance(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        while let Ok(fired) = rx.try_recv() {
            assert!(!timer.claim(&fired));
        }
    }

    #[test]
    fn test_timer_kind_names() {
        assert_eq!(TimerKind::KeepAlive.to_string(), "keep_alive");
        assert_eq!(TimerKind::MotionCooldown.to_string(), "motion_cooldown");
    }
}
