//! The linked switch/motion accessory.
//!
//! - `state`: the `on` flag and accessory phase
//! - `timer`: cancellable periodic push task
//! - `switch_motion`: service registration and the pulse rule
//! - `info`: static accessory information

pub mod info;
pub mod state;
pub mod switch_motion;
pub mod timer;

pub use info::{ACCESSORY_INFO, AccessoryInfo};
pub use state::{AccessoryPhase, AccessoryState};
pub use switch_motion::{AccessoryContext, SwitchMotionAccessory, operational_level};
pub use timer::PushTimer;
