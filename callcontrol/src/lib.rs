//! # Call control
//!
//! The call-control core of lark. It sits between the telephony
//! engine's asynchronous control interface and the command handlers,
//! and turns independent out-of-order channel events into bounded,
//! cancellable operations.
//!
//! - **racedial**: ring every registered contact of an address-of-record
//!   for one waiting call and bridge whichever answers first.
//! - **echo**: correlate a speculative origination with the channel it
//!   eventually produced, with a bounded wait.
//! - **lock**: serialize actions on a shared switchboard resource, with
//!   transaction ids in the logs to reconstruct contention.
//! - **init**: run a startup dependency check in the background,
//!   retrying with backoff until it succeeds.
//! - **server**: the service that owns the registries, plus config
//!   loading and the binary's run loop.

pub mod echo;
pub mod init;
pub mod lock;
pub mod racedial;
pub mod server;

#[cfg(test)]
pub(crate) mod testsupport;
