//! The link between the protocol core and a printer.
//!
//! A transport writes raw bytes and hands out fire-once notification
//! listeners. The BLE implementation lives in [`crate::ble`]; tests use
//! scripted in-memory transports.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::Result;

/// Receives exactly one notification value, then is spent.
pub type NotificationListener = oneshot::Receiver<Vec<u8>>;

/// Transport trait for printer communication.
/// Implement this for your BLE or mock transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write bytes without response. Returns once the write is acknowledged.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Register a listener for the next notification.
    ///
    /// Registration takes effect immediately, so a listener registered before
    /// a write cannot miss the response to it. Notifications arriving between
    /// two registrations are kept for the next listener. Registering again
    /// replaces any listener that has not fired yet.
    fn on_notification(&self) -> NotificationListener;

    /// Drop notifications that arrived while nobody was listening.
    ///
    /// Called before each request so that a stale answer to an earlier,
    /// abandoned request cannot be taken for the new one.
    fn discard_backlog(&self) {}

    /// End the session.
    async fn close(&self) -> Result<()>;
}

/// Notifications kept for a listener that has not registered yet.
pub const BACKLOG_CAPACITY: usize = 32;

/// Holds at most one pending fire-once listener, plus a bounded backlog of
/// notifications that arrived while nobody was listening.
///
/// Transport implementations register listeners here and call
/// [`ListenerSlot::dispatch`] for every incoming notification. A listener
/// registered while the backlog is not empty receives the oldest entry at once.
#[derive(Debug, Default)]
pub struct ListenerSlot {
    inner: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<oneshot::Sender<Vec<u8>>>,
    backlog: VecDeque<Vec<u8>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new listener, dropping any previous one.
    pub fn register(&self) -> NotificationListener {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        state.pending = None;
        match state.backlog.pop_front() {
            Some(value) => {
                // the receiver is alive, this cannot fail
                let _ = tx.send(value);
            }
            None => state.pending = Some(tx),
        }
        rx
    }

    /// Delivers `value` to the pending listener, consuming it.
    ///
    /// Returns false when nobody was listening; the value then waits in the
    /// backlog, evicting the oldest entry when full.
    pub fn dispatch(&self, value: Vec<u8>) -> bool {
        let mut state = self.lock();
        let value = match state.pending.take() {
            Some(tx) => match tx.send(value) {
                Ok(()) => return true,
                Err(value) => value,
            },
            None => value,
        };
        if state.backlog.len() == BACKLOG_CAPACITY {
            state.backlog.pop_front();
        }
        state.backlog.push_back(value);
        false
    }

    /// True when a listener is waiting.
    pub fn is_pending(&self) -> bool {
        self.lock().pending.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Number of notifications waiting for a listener.
    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    /// Forgets notifications nobody listened for.
    pub fn discard_backlog(&self) {
        self.lock().backlog.clear();
    }

    /// Drops the pending listener and the backlog; the receiver sees a closed channel.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.pending = None;
        state.backlog.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    #[test]
    fn listener_fires_once() {
        let slot = ListenerSlot::new();
        let mut rx = slot.register();
        assert!(slot.is_pending());
        assert!(slot.dispatch(vec![1, 2]));
        assert!(!slot.is_pending());
        let_assert!(Ok(value) = rx.try_recv());
        assert!(value == [1, 2]);
        // nobody listening any more
        assert!(!slot.dispatch(vec![3]));
        assert!(slot.backlog_len() == 1);
    }

    #[test]
    fn notifications_between_listeners_are_kept_in_order() {
        let slot = ListenerSlot::new();
        let mut first = slot.register();
        assert!(slot.dispatch(vec![1]));
        assert!(!slot.dispatch(vec![2]));
        assert!(!slot.dispatch(vec![3]));
        let_assert!(Ok(value) = first.try_recv());
        assert!(value == [1]);

        let mut second = slot.register();
        let_assert!(Ok(value) = second.try_recv());
        assert!(value == [2]);
        assert!(!slot.is_pending());
        let mut third = slot.register();
        let_assert!(Ok(value) = third.try_recv());
        assert!(value == [3]);
        assert!(slot.is_pending());
    }

    #[test]
    fn dropped_listener_does_not_lose_the_value() {
        let slot = ListenerSlot::new();
        drop(slot.register());
        assert!(!slot.dispatch(vec![7]));
        let mut rx = slot.register();
        let_assert!(Ok(value) = rx.try_recv());
        assert!(value == [7]);
    }

    #[test]
    fn backlog_is_bounded() {
        let slot = ListenerSlot::new();
        for i in 0..BACKLOG_CAPACITY + 5 {
            slot.dispatch(vec![i as u8]);
        }
        assert!(slot.backlog_len() == BACKLOG_CAPACITY);
        let mut rx = slot.register();
        let_assert!(Ok(value) = rx.try_recv());
        assert!(value == [5]);

        slot.discard_backlog();
        assert!(slot.backlog_len() == 0);
    }

    #[test]
    fn registering_again_replaces_listener() {
        let slot = ListenerSlot::new();
        let mut first = slot.register();
        let mut second = slot.register();
        assert!(slot.dispatch(vec![9]));
        assert!(first.try_recv().is_err());
        let_assert!(Ok(value) = second.try_recv());
        assert!(value == [9]);
    }
}
