//! Reactive registers
//!
//! A register holds an optional operand and a list of subscriber callbacks.
//! Assigning a value notifies all subscribers; notification fans the
//! callbacks out onto the shared worker pool and waits for the whole set to
//! finish before returning (fan-out/fan-in). A global enable flag, shared by
//! every register of one interpreter, gates all notification.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::cell::Cell;
use crate::stack::Operand;

/// Subscriber callback, invoked with the register's value at notification
/// time (`None` after a `reset`).
pub type Subscriber = Arc<dyn Fn(Option<Operand>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    value: Option<Operand>,
    subscribers: Vec<Subscriber>,
}

/// Named, single-valued reactive storage cell.
///
/// Value mutation and subscriber notification happen atomically under one
/// lock per register: the lock is held for the full notification round, so a
/// subscriber writing the same register deadlocks by construction.
pub struct Reg {
    inner: Mutex<Inner>,
    updates_enabled: Arc<AtomicBool>,
}

impl Reg {
    pub(crate) fn new(initial: Option<Operand>, updates_enabled: Arc<AtomicBool>) -> Self {
        Reg {
            inner: Mutex::new(Inner {
                value: initial,
                subscribers: Vec::new(),
            }),
            updates_enabled,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Option<Operand> {
        self.lock().value
    }

    /// Assign a value and notify subscribers.
    pub fn set(&self, value: Operand) {
        let mut inner = self.lock();
        inner.value = Some(value);
        self.notify_locked(&inner);
    }

    /// Remove the value without notifying.
    pub fn clear(&self) {
        self.lock().value = None;
    }

    /// Remove the value and notify subscribers with the absence.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.value = None;
        self.notify_locked(&inner);
    }

    /// Re-notify subscribers with the current value.
    pub fn notify(&self) {
        let inner = self.lock();
        self.notify_locked(&inner);
    }

    /// Attach a subscriber. If a value is already present, one notification
    /// round runs immediately for the whole subscriber set.
    pub fn subscribe(&self, subscriber: Subscriber) {
        let mut inner = self.lock();
        inner.subscribers.push(subscriber);
        if inner.value.is_some() {
            self.notify_locked(&inner);
        }
    }

    /// Fan all subscribers out onto the worker pool and wait for the set.
    ///
    /// Callers hold the register lock, which makes the mutation and its
    /// notification one atomic step with respect to other writers.
    fn notify_locked(&self, inner: &Inner) {
        if !self.updates_enabled.load(Ordering::Acquire) {
            return;
        }
        if inner.subscribers.is_empty() {
            return;
        }

        let value = inner.value;
        trace!(subscribers = inner.subscribers.len(), "register update");

        let subscribers: Vec<Subscriber> = inner.subscribers.clone();
        rayon::scope(move |scope| {
            for subscriber in subscribers {
                scope.spawn(move |_| subscriber(value));
            }
        });
    }
}

impl Cell for Reg {
    fn apply(&self, consumer: &mut dyn FnMut(Operand)) {
        // Snapshot under the lock, deliver after release: a consumer may
        // write this same register.
        let value = self.get();
        if let Some(value) = value {
            consumer(value);
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "[{}]", value),
            None => write!(f, "[_]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_flag(on: bool) -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(on))
    }

    fn collector() -> (Subscriber, Arc<Mutex<Vec<Option<Operand>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscriber: Subscriber = Arc::new(move |value| {
            sink.lock().unwrap().push(value);
        });
        (subscriber, seen)
    }

    #[test]
    fn test_set_get_clear() {
        let reg = Reg::new(None, enabled_flag(true));
        assert_eq!(reg.get(), None);
        reg.set(3);
        assert_eq!(reg.get(), Some(3));
        reg.clear();
        assert_eq!(reg.get(), None);
    }

    #[test]
    fn test_set_notifies_and_waits() {
        let reg = Reg::new(None, enabled_flag(true));
        let (subscriber, seen) = collector();
        reg.subscribe(subscriber);
        reg.set(1);
        reg.set(2);
        // set() fans in before returning, so the order is deterministic.
        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_subscribe_with_present_value_notifies_immediately() {
        let reg = Reg::new(Some(9), enabled_flag(true));
        let (subscriber, seen) = collector();
        reg.subscribe(subscriber);
        assert_eq!(*seen.lock().unwrap(), vec![Some(9)]);
    }

    #[test]
    fn test_disabled_updates_suppress_notification() {
        let flag = enabled_flag(false);
        let reg = Reg::new(None, Arc::clone(&flag));
        let (subscriber, seen) = collector();
        reg.subscribe(subscriber);
        reg.set(1);
        assert!(seen.lock().unwrap().is_empty());

        flag.store(true, Ordering::Release);
        reg.set(2);
        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[test]
    fn test_reset_notifies_with_absence() {
        let reg = Reg::new(Some(5), enabled_flag(true));
        let (subscriber, seen) = collector();
        reg.subscribe(subscriber);
        reg.reset();
        assert_eq!(*seen.lock().unwrap(), vec![Some(5), None]);
        assert_eq!(reg.get(), None);
    }

    #[test]
    fn test_clear_does_not_notify() {
        let reg = Reg::new(Some(5), enabled_flag(true));
        let (subscriber, seen) = collector();
        reg.subscribe(subscriber);
        seen.lock().unwrap().clear();
        reg.clear();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cell_apply_delivers_present_value_only() {
        let reg = Reg::new(None, enabled_flag(true));
        let mut seen = Vec::new();
        reg.apply(&mut |v| seen.push(v));
        assert!(seen.is_empty());

        reg.set(4);
        reg.apply(&mut |v| seen.push(v));
        assert_eq!(seen, vec![4]);
    }

    #[test]
    fn test_display() {
        let reg = Reg::new(None, enabled_flag(true));
        assert_eq!(reg.to_string(), "[_]");
        reg.set(7);
        assert_eq!(reg.to_string(), "[7]");
    }
}
