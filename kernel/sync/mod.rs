//! Synchronization primitives
//!
//! Busy-wait locks usable from both thread and interrupt context.

pub mod spinlock;

// Re-export SpinLock for convenience
pub use spinlock::{RawSpinLock, SpinLock, SpinLockGuard};
