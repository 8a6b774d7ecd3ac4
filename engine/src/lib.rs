//! Client for the telephony engine's control interface.
//!
//! The engine exposes channels (call legs) and bridges (mixing points)
//! over an HTTP control API and pushes events elsewhere. Everything in
//! lark that touches a call goes through [`EngineClient`].
//!
//! A channel or bridge can vanish at any moment because the far end hung
//! up first. The engine reports that as 404, which this crate surfaces
//! as [`EngineError::NotFound`] so callers can tell a lost race from a
//! real failure.

mod client;
mod message;

pub use client::{EngineClient, HttpEngineClient};
pub use message::{ChannelInfo, ChannelState};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The channel or bridge doesn't exist any more.
    #[error("not found")]
    NotFound,

    /// The engine couldn't be reached at all.
    #[error("engine transport error")]
    Transport(#[source] anyhow::Error),

    /// The engine answered with an unexpected status.
    #[error("engine api error: {status} {body}")]
    Api { status: u16, body: String },
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.into())
    }
}
