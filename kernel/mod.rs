//! Kernel collaborators
//!
//! The pieces of the surrounding kernel the hotplug subsystem leans on:
//! busy-wait locks and the scheduler integration surface.

pub mod sched;
pub mod sync;
