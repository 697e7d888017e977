//! Switch entities.
//!
//! - [`CoilSwitch`] - one coil, written and read directly
//! - [`RegisterSwitch`] - one bit of a holding register, verified through a
//!   status register after a settle delay

mod address;
mod coil;
mod register;

pub use address::{BitAddress, SwitchCommand, SwitchState};
pub use coil::CoilSwitch;
pub use register::{DEFAULT_SETTLE_DELAY, RegisterSwitch, RegisterSwitchSpec, VerifyOutcome};
