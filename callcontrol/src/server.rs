//! The call-control service and its run loop.
//!
//! One [`CallControlService`] instance owns every registry in this
//! crate: the race-dial sessions, the dial-echo entries, the
//! switchboard lock and the background initializer. Command handlers
//! get an `Arc` of it and nothing else.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use lark_engine::{EngineClient, EngineError, HttpEngineClient};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::echo::{DialEcho, EchoOutcome};
use crate::init::{BackgroundInit, InitAction, RetryPolicy, UsageError};
use crate::lock::SwitchboardLock;
use crate::racedial::RaceDial;

#[derive(Deserialize)]
pub struct Config {
    pub engine_host: String,
    pub engine_username: String,
    pub engine_password: String,
    /// Application name the engine uses to route answered race-dial
    /// legs back to us.
    pub app: String,
}

impl Config {
    pub fn load() -> Result<Config> {
        let path = std::env::var("LARK_CONF")
            .unwrap_or_else(|_| "/etc/lark/lark.conf".to_string());
        let contents = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

pub struct CallControlService {
    engine: Arc<dyn EngineClient>,
    app: String,
    sessions: Arc<Mutex<HashMap<String, Arc<RaceDial>>>>,
    echo: DialEcho,
    switchboard_lock: SwitchboardLock,
    init: BackgroundInit,
}

impl CallControlService {
    pub fn new(engine: Arc<dyn EngineClient>, app: &str) -> CallControlService {
        CallControlService {
            engine,
            app: app.to_string(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            echo: DialEcho::new(),
            switchboard_lock: SwitchboardLock::new(),
            init: BackgroundInit::new(),
        }
    }

    /// Start ringing every contact of `aor` for the waiting call on
    /// `calling_channel`. Returns the session id the answering leg
    /// joins with.
    pub async fn start_race_dial(
        &self,
        calling_channel: &str,
        aor: &str,
    ) -> String {
        let session = Arc::new(RaceDial::new(
            self.engine.clone(),
            &self.app,
            calling_channel,
            aor,
        ));
        let session_id = session.id.clone();
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.clone(), session.clone());

        let sessions = self.sessions.clone();
        let task_session = session.clone();
        let id = session_id.clone();
        let handle = tokio::spawn(async move {
            task_session.poll_loop().await;
            // the registry only holds live sessions
            sessions.lock().unwrap().remove(&id);
        });
        session.set_task(handle);
        session_id
    }

    /// A dialed contact answered on `answering_channel`.
    pub async fn join_race_dial(
        &self,
        session_id: &str,
        answering_channel: &str,
    ) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("no race dial session {session_id}"))?;
        session.join(answering_channel).await
    }

    /// Tear a session down. Unknown or already stopped sessions are
    /// fine, teardown handlers fire more than once.
    pub async fn stop_race_dial(&self, session_id: &str) {
        let session = self.sessions.lock().unwrap().get(session_id).cloned();
        if let Some(session) = session {
            session.stop().await;
        }
    }

    pub fn has_race_dial(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    pub async fn stop_all_race_dials(&self) {
        let sessions: Vec<Arc<RaceDial>> =
            self.sessions.lock().unwrap().values().cloned().collect();
        for session in sessions {
            session.stop().await;
        }
    }

    pub fn register_echo(&self) -> String {
        self.echo.register()
    }

    pub fn resolve_echo(&self, request_id: &str, result: Value) {
        self.echo.resolve(request_id, result);
    }

    pub async fn wait_echo(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> EchoOutcome {
        self.echo.wait(request_id, timeout).await
    }

    pub fn switchboard_lock(&self) -> &SwitchboardLock {
        &self.switchboard_lock
    }

    pub fn start_init(
        &self,
        policy: RetryPolicy,
        action: InitAction,
    ) -> Result<(), UsageError> {
        self.init.start(policy, action)
    }

    pub async fn stop_init(&self) {
        self.init.stop().await;
    }
}

pub struct Server {
    service: Arc<CallControlService>,
}

impl Server {
    pub fn new() -> Result<Server> {
        let config = Config::load()?;
        let engine: Arc<dyn EngineClient> = Arc::new(HttpEngineClient::new(
            &config.engine_host,
            &config.engine_username,
            &config.engine_password,
        ));
        let service = Arc::new(CallControlService::new(engine, &config.app));
        Ok(Server { service })
    }

    pub fn service(&self) -> Arc<CallControlService> {
        self.service.clone()
    }

    pub async fn run(&self) -> Result<()> {
        let engine = self.service.engine.clone();
        let probe: InitAction = Box::new(move || {
            let engine = engine.clone();
            Box::pin(async move {
                // any answer at all means the engine is up
                match engine.channel_state("startup-probe").await {
                    Ok(_) | Err(EngineError::NotFound) => Ok(()),
                    Err(err) => Err(err.into()),
                }
            })
        });
        self.service.start_init(RetryPolicy::TransportOnly, probe)?;

        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        self.service.stop_init().await;
        self.service.stop_all_race_dials().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses() {
        let config: Config = toml::from_str(
            r#"
            engine_host = "127.0.0.1:8088"
            engine_username = "lark"
            engine_password = "secret"
            app = "lark"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine_host, "127.0.0.1:8088");
        assert_eq!(config.app, "lark");
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_on_unknown_session_is_an_error() {
        let engine = Arc::new(crate::testsupport::FakeEngine::new());
        let service = Arc::new(CallControlService::new(engine, "lark"));
        assert!(service
            .join_race_dial("no-such-session", "channel-1")
            .await
            .is_err());
    }
}
