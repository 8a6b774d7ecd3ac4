//! Race dial: ring every registered contact of an address-of-record
//! for one waiting call, bridge whichever answers first, abandon the
//! rest.
//!
//! An address-of-record can gain registrations while the call is
//! ringing (a mobile app waking up on a push), so the contact set is
//! re-polled on a fixed interval and every newly seen contact gets one
//! origination, tagged with the session id so the engine routes the
//! answering leg back to [`RaceDial::join`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use lark_engine::{EngineClient, EngineError};
#[cfg(test)]
use lark_engine::ChannelState;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One "dial all contacts for this call" session. Owned by its polling
/// task, referenced through the service registry by session id.
pub struct RaceDial {
    pub id: String,
    calling_channel: String,
    aor: String,
    app: String,
    engine: Arc<dyn EngineClient>,
    attempted: Mutex<HashSet<String>>,
    channels: Mutex<Vec<String>>,
    stopped: AtomicBool,
    wake: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RaceDial {
    pub(crate) fn new(
        engine: Arc<dyn EngineClient>,
        app: &str,
        calling_channel: &str,
        aor: &str,
    ) -> RaceDial {
        RaceDial {
            id: lark_utils::uuid(),
            calling_channel: calling_channel.to_string(),
            aor: aor.to_string(),
            app: app.to_string(),
            engine,
            attempted: Mutex::new(HashSet::new()),
            channels: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.lock().unwrap() = Some(handle);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) async fn poll_loop(&self) {
        info!(
            session = self.id,
            channel = self.calling_channel,
            aor = self.aor,
            "race dial started"
        );
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            if let Err(err) = self.poll_once().await {
                warn!(session = self.id, "race dial poll error: {err:?}");
            }
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
        info!(session = self.id, "race dial stopped");
    }

    async fn poll_once(&self) -> Result<()> {
        match self.engine.channel_state(&self.calling_channel).await {
            Ok(_) => {}
            Err(EngineError::NotFound) => {
                // the caller went away while we were ringing contacts
                info!(
                    session = self.id,
                    channel = self.calling_channel,
                    "caller is gone, tearing the race dial down"
                );
                self.stopped.store(true, Ordering::SeqCst);
                self.hangup_ringing().await;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        let contacts = self
            .engine
            .get_contacts(&self.calling_channel, &self.aor)
            .await?;
        for contact in contacts {
            let fresh = self.attempted.lock().unwrap().insert(contact.clone());
            if !fresh {
                continue;
            }
            info!(session = self.id, contact, "originating to contact");
            let app_args = format!("racedial,{}", self.id);
            match self.engine.originate(&contact, &self.app, &app_args).await {
                Ok(channel_id) => {
                    self.channels.lock().unwrap().push(channel_id);
                }
                Err(err) => {
                    warn!(
                        session = self.id,
                        contact, "originate failed: {err:?}"
                    );
                }
            }
        }
        Ok(())
    }

    /// Hang up every channel this session created that hasn't been
    /// answered. Channels that are already gone are skipped, that race
    /// is normal.
    async fn hangup_ringing(&self) {
        let channels: Vec<String> = self.channels.lock().unwrap().clone();
        for channel_id in channels {
            match self.engine.channel_state(&channel_id).await {
                Ok(state) if !state.is_answered() => {
                    match self.engine.hangup(&channel_id).await {
                        Ok(()) | Err(EngineError::NotFound) => {}
                        Err(err) => warn!(
                            session = self.id,
                            channel = channel_id,
                            "hangup failed: {err:?}"
                        ),
                    }
                }
                Ok(_) => {}
                Err(EngineError::NotFound) => {}
                Err(err) => warn!(
                    session = self.id,
                    channel = channel_id,
                    "channel state check failed: {err:?}"
                ),
            }
        }
    }

    /// Stop the polling task and wait until it has fully exited. Safe
    /// to call more than once and after the session stopped itself.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// A contact answered: halt polling, answer both legs and bridge
    /// them. Either leg may already be gone, which just means the
    /// caller left first; the join gives up quietly.
    pub(crate) async fn join(&self, answering_channel: &str) -> Result<()> {
        // no new origination may race with the bridge setup
        self.stop().await;

        match self.engine.answer(&self.calling_channel).await {
            Ok(()) => {}
            Err(EngineError::NotFound) => {
                info!(
                    session = self.id,
                    channel = self.calling_channel,
                    "caller left before the join"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        match self.engine.answer(answering_channel).await {
            Ok(()) => {}
            Err(EngineError::NotFound) => {
                info!(
                    session = self.id,
                    channel = answering_channel,
                    "winner left before the join"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        self.engine.create_bridge(&self.id).await?;
        self.engine
            .add_to_bridge(&self.id, &self.calling_channel)
            .await?;
        self.engine.add_to_bridge(&self.id, answering_channel).await?;
        info!(
            session = self.id,
            channel = answering_channel,
            "race dial joined"
        );
        Ok(())
    }
}
