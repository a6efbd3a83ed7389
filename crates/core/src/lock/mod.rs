//! Filesystem run locks.
//!
//! A run lock guarantees that at most one process of a given job kind is
//! active at a time. Markers are created with create-new semantics so two
//! racing processes can never both observe "absent" and proceed. The marker
//! holds the owner's PID, which lets a later run reclaim a marker left behind
//! by a process that was killed without cleaning up.
//!
//! # Example
//!
//! ```ignore
//! use shuttle_core::lock::{LockAcquisition, RunLock};
//!
//! let lock = RunLock::new("/var/lock");
//! match lock.acquire("shuttle-upload")? {
//!     LockAcquisition::Held(guard) => {
//!         // ... critical section ...
//!         guard.release()?;
//!     }
//!     LockAcquisition::AlreadyHeld { .. } => return Ok(()),
//! }
//! ```

mod error;
mod run_lock;

pub use error::LockError;
pub use run_lock::{LockAcquisition, RunLock, RunLockGuard};
