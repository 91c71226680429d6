//! Connection lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Idle → Connected:                 connect()
//! Connected → Disconnecting:        disconnect()
//! Disconnecting → Disconnected:     disconnect sequence finished
//! Disconnected → Connected:         connect() again
//! ```
//!
//! Transitions are compare-and-swap, so a duplicate `connect()` or a second
//! `disconnect()` racing the first is a no-op.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle = 0,
    Connected = 1,
    Disconnecting = 2,
    Disconnected = 3,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Connected,
            2 => LifecycleState::Disconnecting,
            3 => LifecycleState::Disconnected,
            _ => LifecycleState::Idle,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Idle/Disconnected → Connected.
    pub fn begin_connect(&self) -> bool {
        self.transition(LifecycleState::Idle, LifecycleState::Connected)
            || self.transition(LifecycleState::Disconnected, LifecycleState::Connected)
    }

    /// Connected → Disconnecting. Only one caller wins.
    pub fn begin_disconnect(&self) -> bool {
        self.transition(LifecycleState::Connected, LifecycleState::Disconnecting)
    }

    pub fn finish_disconnect(&self) {
        self.state.store(LifecycleState::Disconnected as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
