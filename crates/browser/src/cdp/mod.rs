//! CDP (Chrome DevTools Protocol) client implementation.
//!
//! Core principle: single WebSocket connection, multiplexed sessions.
//! Request/response matching by ID, events fanned out to subscribers.

pub mod client;
pub mod protocol;

pub use client::{CdpClient, CdpError, EventWaiter, Result, SubscriptionId};
pub use protocol::{CdpEvent, CdpRequest, CdpResponse, TargetInfo};
