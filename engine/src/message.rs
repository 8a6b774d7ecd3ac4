use std::str::FromStr;

use serde::Deserialize;

/// One leg of a call as the engine reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    state: String,
}

impl ChannelInfo {
    pub fn state(&self) -> ChannelState {
        ChannelState::from_str(&self.state).unwrap_or(ChannelState::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Down,
    Ring,
    Ringing,
    Up,
    Busy,
    Unknown,
}

impl ChannelState {
    pub fn is_answered(&self) -> bool {
        matches!(self, ChannelState::Up)
    }
}

impl FromStr for ChannelState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<ChannelState, Self::Err> {
        Ok(match s {
            "Down" => ChannelState::Down,
            "Ring" => ChannelState::Ring,
            "Ringing" => ChannelState::Ringing,
            "Up" => ChannelState::Up,
            "Busy" => ChannelState::Busy,
            _ => ChannelState::Unknown,
        })
    }
}
