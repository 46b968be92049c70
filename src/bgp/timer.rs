//! Session countdown timers
//!
//! Each timer owns a send handle onto the state machine's event channel and
//! publishes its expiry as a typed event. Cancellation is a matter of
//! clearing the active flag and aborting the counting task; the state
//! machine never hands out references to itself.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::fsm::Event;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Jitter factor range applied to restarting timers (RFC 4271 Section 10)
fn apply_jitter(value: u16) -> u16 {
    let factor: f32 = rand::rng().random_range(0.75..=1.0);
    (f32::from(value) * factor).round() as u16
}

/// A one-shot countdown that delivers a typed event on expiry
#[derive(Debug)]
pub struct SessionTimer {
    name: &'static str,
    initial: u16,
    value: Arc<AtomicU16>,
    active: Arc<AtomicBool>,
    jitter: bool,
    expire_event: Event,
    events: UnboundedSender<Event>,
    task: Option<JoinHandle<()>>,
}

impl SessionTimer {
    /// Create an inactive timer with the given initial value in seconds
    #[must_use]
    pub fn new(
        name: &'static str,
        initial: u16,
        jitter: bool,
        expire_event: Event,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            name,
            initial,
            value: Arc::new(AtomicU16::new(initial)),
            active: Arc::new(AtomicBool::new(false)),
            jitter,
            expire_event,
            events,
            task: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn remaining(&self) -> u16 {
        self.value.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn initial_value(&self) -> u16 {
        self.initial
    }

    /// Arm the timer from its initial value. An already-running timer is
    /// stopped first, so the expiry fires at most once per active period.
    pub fn start(&mut self) {
        self.stop();
        let initial = if self.jitter {
            apply_jitter(self.initial)
        } else {
            self.initial
        };
        self.value.store(initial, Ordering::Release);
        self.active.store(true, Ordering::Release);
        log::trace!("{} timer armed with {initial}s", self.name);
        let value = Arc::clone(&self.value);
        let active = Arc::clone(&self.active);
        let events = self.events.clone();
        let expire_event = self.expire_event.clone();
        let name = self.name;
        self.task = Some(tokio::spawn(async move {
            loop {
                if !active.load(Ordering::Acquire) {
                    break;
                }
                if value.load(Ordering::Acquire) == 0 {
                    // Deactivate before publishing so the expiry is
                    // delivered exactly once
                    active.store(false, Ordering::Release);
                    log::trace!("{name} timer expired");
                    let _ = events.send(expire_event);
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = value.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                    v.checked_sub(1)
                });
            }
        }));
    }

    /// Deactivate without firing. A no-op on an expired or idle timer.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Stop, then start again from the initial value
    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    /// Change the initial value, then restart
    pub fn restart_with(&mut self, initial: u16) {
        self.initial = initial;
        self.restart();
    }

    /// Stop and reload the remaining value without starting
    pub fn reset(&mut self) {
        self.stop();
        self.value.store(self.initial, Ordering::Release);
    }

    /// Stop and set both the initial and remaining value without starting
    pub fn reset_with(&mut self, initial: u16) {
        self.stop();
        self.initial = initial;
        self.value.store(initial, Ordering::Release);
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_timer(initial: u16, events: UnboundedSender<Event>) -> SessionTimer {
        SessionTimer::new("test", initial, false, Event::HoldTimerExpires, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_delivers_event_exactly_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = test_timer(3, tx);
        timer.start();
        assert!(timer.is_active());
        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::HoldTimerExpires);
        assert!(!timer.is_active());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = test_timer(3, tx);
        timer.start();
        timer.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_active());
        // Stop after the fact stays a no-op
        timer.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_changes_initial_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = test_timer(100, tx);
        timer.restart_with(2);
        assert_eq!(timer.initial_value(), 2);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_are_independent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut left = SessionTimer::new("left", 2, false, Event::KeepaliveTimerExpires, tx.clone());
        let mut right = SessionTimer::new("right", 5, false, Event::HoldTimerExpires, tx);
        left.start();
        right.start();
        left.stop();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::HoldTimerExpires);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = test_timer(30, tx);
        timer.reset_with(7);
        timer.reset_with(7);
        assert_eq!(timer.initial_value(), 7);
        assert_eq!(timer.remaining(), 7);
        assert!(!timer.is_active());
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..100 {
            let jittered = apply_jitter(100);
            assert!((75..=100).contains(&jittered));
        }
    }
}
