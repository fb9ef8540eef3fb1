//! # Message Bridge
//!
//! Request/response plumbing between an untrusted embedded page and the wallet.
//!
//! ## Key Concepts
//! - The page picks a `reqId` per request; the wallet echoes it verbatim
//! - `PING` is answered with `PONG` without reaching the action dispatcher
//! - Dispatcher errors reach the page only as the `error` string of an error response
//! - While dApp access is disabled, requests get no answer at all
//!
//! [`MessageBridge`] is the wallet side; [`PageClient`] is the page side that
//! tracks pending requests, their timeouts and disconnects.

mod client;
mod server;

pub use client::{PageClient, PendingRequests};
pub use server::{InboundFrame, MessageBridge};
