//! Entity capabilities exposed to the host.

use std::future::Future;

/// A polled Modbus entity.
pub trait Entity: Send {
    /// Entity name.
    fn name(&self) -> &str;

    /// Current state as text, `None` until known.
    fn state(&self) -> Option<String>;

    /// Whether the last transaction with the device succeeded.
    fn available(&self) -> bool;

    /// Refresh the cached state from the device.
    ///
    /// Never fails: transport problems only show up through
    /// [`available`](Self::available) and stale state.
    fn update(&mut self) -> impl Future<Output = ()> + Send;
}

/// An entity that can be turned on and off.
pub trait Switch: Entity {
    /// Cached on/off state, `None` while unknown.
    fn is_on(&self) -> Option<bool>;

    fn turn_on(&mut self) -> impl Future<Output = ()> + Send;

    fn turn_off(&mut self) -> impl Future<Output = ()> + Send;
}

/// Text state of a switch-like entity.
pub(crate) fn on_off(is_on: Option<bool>) -> Option<String> {
    is_on.map(|on| if on { "on" } else { "off" }.to_string())
}

/// Per-entity availability flag.
///
/// Starts available; every transaction moves it to the outcome of that
/// transaction. Setters report whether the flag changed so callers can log
/// transitions instead of every failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability(bool);

impl Availability {
    pub fn new() -> Self {
        Self(true)
    }

    pub fn is_available(&self) -> bool {
        self.0
    }

    /// Mark available, returning `true` if it was unavailable before.
    pub fn set_available(&mut self) -> bool {
        let changed = !self.0;
        self.0 = true;
        changed
    }

    /// Mark unavailable, returning `true` if it was available before.
    pub fn set_unavailable(&mut self) -> bool {
        let changed = self.0;
        self.0 = false;
        changed
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}
