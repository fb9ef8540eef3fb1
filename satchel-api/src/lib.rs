//! # Satchel Substrate API
//!
//! Satchel is the background concurrency and messaging substrate of a browser-extension
//! wallet. This crate holds the pieces that the substrate shares with its collaborators:
//! the ports it calls out through and the wire protocol it speaks with embedded pages.
//!
//! ## Core Components
//!
//! - **Action dispatcher**: the wallet's domain request handler, called by the message bridge
//! - **Session store**: persistent key/value storage shared by every open wallet surface
//! - **Wallet locker**: the operation that locks the wallet session
//! - **Clock**: wall-clock source, injectable for deterministic watchdog evaluation
//! - **Page messages**: the bit-exact request/response frames exchanged with a page
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use satchel_api::message::{PageRequest, PageResponse};
//!
//! let request: PageRequest = serde_json::from_str(raw)?;
//! if request.is_ping() {
//!     return PageResponse::pong(request.req_id);
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`dispatcher`]: Action dispatcher port
//! - [`errors`]: Error types shared with collaborators
//! - [`message`]: Page wire protocol
//! - [`session`]: Session state, storage port, clock and locker ports
//! - [`types`]: Common type definitions

pub mod dispatcher;
pub mod errors;
pub mod message;
pub mod session;
pub mod types;

pub use dispatcher::ActionDispatcher;
pub use errors::{BridgeError, StorageError};
pub use message::{PageMessageType, PageRequest, PageResponse, PING, PONG};
pub use session::{Clock, SessionState, SessionStore, SystemClock, WalletLocker};
pub use types::{BoxedFuture, SatchelResult};
