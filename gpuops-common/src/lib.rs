//! Wire types shared by the controller and the node agent.
//!
//! Everything here is pure data plus the one piece of shared arithmetic
//! (`round4`) that both sides need to agree on bit-for-bit. No I/O, no
//! async, no database types — this crate exists so the JSON contract
//! between the two binaries can never drift.

mod action;
mod money;
mod wire;

pub use action::Action;
pub use money::round4;
pub use wire::{ControllerResponse, GpuUsage, MetricsData, UserProcess};
