//! In-memory engine used by the tests in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lark_engine::{ChannelState, EngineClient, EngineError};

pub struct FakeEngine {
    contacts: Mutex<Vec<String>>,
    channels: Mutex<HashMap<String, ChannelState>>,
    originated: Mutex<Vec<String>>,
    hangups: Mutex<Vec<String>>,
    bridges: Mutex<HashMap<String, Vec<String>>>,
    next_channel: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> FakeEngine {
        FakeEngine {
            contacts: Mutex::new(Vec::new()),
            channels: Mutex::new(HashMap::new()),
            originated: Mutex::new(Vec::new()),
            hangups: Mutex::new(Vec::new()),
            bridges: Mutex::new(HashMap::new()),
            next_channel: AtomicUsize::new(1),
        }
    }

    pub fn add_channel(&self, channel_id: &str, state: ChannelState) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), state);
    }

    pub fn remove_channel(&self, channel_id: &str) {
        self.channels.lock().unwrap().remove(channel_id);
    }

    pub fn set_contacts(&self, contacts: &[&str]) {
        *self.contacts.lock().unwrap() =
            contacts.iter().map(|c| c.to_string()).collect();
    }

    pub fn originated(&self) -> Vec<String> {
        self.originated.lock().unwrap().clone()
    }

    pub fn hangups(&self) -> Vec<String> {
        self.hangups.lock().unwrap().clone()
    }

    pub fn state_of(&self, channel_id: &str) -> Option<ChannelState> {
        self.channels.lock().unwrap().get(channel_id).copied()
    }

    pub fn bridge_channels(&self, bridge_id: &str) -> Vec<String> {
        self.bridges
            .lock()
            .unwrap()
            .get(bridge_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn get_contacts(
        &self,
        channel_id: &str,
        _aor: &str,
    ) -> Result<Vec<String>, EngineError> {
        if !self.channels.lock().unwrap().contains_key(channel_id) {
            return Ok(Vec::new());
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn originate(
        &self,
        endpoint: &str,
        _app: &str,
        _app_args: &str,
    ) -> Result<String, EngineError> {
        let n = self.next_channel.fetch_add(1, Ordering::SeqCst);
        let channel_id = format!("channel-{n}");
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id.clone(), ChannelState::Ringing);
        self.originated.lock().unwrap().push(endpoint.to_string());
        Ok(channel_id)
    }

    async fn channel_state(
        &self,
        channel_id: &str,
    ) -> Result<ChannelState, EngineError> {
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .copied()
            .ok_or(EngineError::NotFound)
    }

    async fn answer(&self, channel_id: &str) -> Result<(), EngineError> {
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(channel_id) {
            Some(state) => {
                *state = ChannelState::Up;
                Ok(())
            }
            None => Err(EngineError::NotFound),
        }
    }

    async fn hangup(&self, channel_id: &str) -> Result<(), EngineError> {
        let removed = self.channels.lock().unwrap().remove(channel_id);
        match removed {
            Some(_) => {
                self.hangups.lock().unwrap().push(channel_id.to_string());
                Ok(())
            }
            None => Err(EngineError::NotFound),
        }
    }

    async fn create_bridge(&self, bridge_id: &str) -> Result<(), EngineError> {
        self.bridges
            .lock()
            .unwrap()
            .insert(bridge_id.to_string(), Vec::new());
        Ok(())
    }

    async fn add_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> Result<(), EngineError> {
        if !self.channels.lock().unwrap().contains_key(channel_id) {
            return Err(EngineError::NotFound);
        }
        let mut bridges = self.bridges.lock().unwrap();
        match bridges.get_mut(bridge_id) {
            Some(channels) => {
                channels.push(channel_id.to_string());
                Ok(())
            }
            None => Err(EngineError::NotFound),
        }
    }
}
