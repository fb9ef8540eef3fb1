//! # Exclusive Client Lock
//!
//! Serializes every operation on the shared wallet client. Regular callers are
//! served first-come-first-served; idle tasks run only while nobody is queued.
//! A ticket that is dropped, whether by error, panic or cancellation, releases
//! the lock.

mod client;
mod ticket;

pub use client::SharedClient;
pub use ticket::{ClientLock, LockState, LockTicket};
