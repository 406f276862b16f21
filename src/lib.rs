//! Switch2Sensor bridge library.
//!
//! A virtual switch linked to a motion sensor: turning the switch on makes
//! the motion sensor report one detection at the next timer tick, after which
//! the switch resets. The accessory talks to its host through the traits in
//! [`host`], so it runs on the MQTT host, the in-memory host, or any bridge
//! that implements them.

pub mod accessory;
pub mod config;
pub mod error;
pub mod host;
