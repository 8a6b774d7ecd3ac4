use async_trait::async_trait;
use serde::Deserialize;

use crate::message::{ChannelInfo, ChannelState};
use crate::EngineError;

/// The command surface lark needs from the engine.
///
/// All operations may come back with [`EngineError::NotFound`] when the
/// target already vanished; callers treat that as the far end hanging up
/// first, not as a failure.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Current contact registrations of an address-of-record, read
    /// through a dialplan function on the channel. Empty when the
    /// channel is gone.
    async fn get_contacts(
        &self,
        channel_id: &str,
        aor: &str,
    ) -> Result<Vec<String>, EngineError>;

    /// Originate an outbound call and tag it with the application that
    /// routes it back to us on answer. Returns the new channel id.
    async fn originate(
        &self,
        endpoint: &str,
        app: &str,
        app_args: &str,
    ) -> Result<String, EngineError>;

    async fn channel_state(
        &self,
        channel_id: &str,
    ) -> Result<ChannelState, EngineError>;

    async fn answer(&self, channel_id: &str) -> Result<(), EngineError>;

    async fn hangup(&self, channel_id: &str) -> Result<(), EngineError>;

    /// Create a mixing bridge with a caller chosen id.
    async fn create_bridge(&self, bridge_id: &str) -> Result<(), EngineError>;

    async fn add_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> Result<(), EngineError>;
}

pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct VariableValue {
    value: String,
}

#[derive(Deserialize)]
struct CreatedChannel {
    id: String,
}

impl HttpEngineClient {
    pub fn new(host: &str, username: &str, password: &str) -> HttpEngineClient {
        HttpEngineClient {
            client: reqwest::Client::new(),
            base_url: format!("http://{host}/ari"),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, EngineError> {
        let resp = req
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn get_contacts(
        &self,
        channel_id: &str,
        aor: &str,
    ) -> Result<Vec<String>, EngineError> {
        let variable = format!("PJSIP_DIAL_CONTACTS({aor})");
        let req = self
            .client
            .get(self.url(&format!(
                "/channels/{}/variable",
                urlencoding::encode(channel_id)
            )))
            .query(&[("variable", variable.as_str())]);
        let value: VariableValue = match self.send(req).await {
            Ok(resp) => resp.json().await?,
            Err(EngineError::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(value
            .value
            .split('&')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn originate(
        &self,
        endpoint: &str,
        app: &str,
        app_args: &str,
    ) -> Result<String, EngineError> {
        let req = self.client.post(self.url("/channels")).query(&[
            ("endpoint", endpoint),
            ("app", app),
            ("appArgs", app_args),
        ]);
        let channel: CreatedChannel = self.send(req).await?.json().await?;
        Ok(channel.id)
    }

    async fn channel_state(
        &self,
        channel_id: &str,
    ) -> Result<ChannelState, EngineError> {
        let req = self.client.get(
            self.url(&format!("/channels/{}", urlencoding::encode(channel_id))),
        );
        let channel: ChannelInfo = self.send(req).await?.json().await?;
        Ok(channel.state())
    }

    async fn answer(&self, channel_id: &str) -> Result<(), EngineError> {
        let req = self.client.post(self.url(&format!(
            "/channels/{}/answer",
            urlencoding::encode(channel_id)
        )));
        self.send(req).await?;
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<(), EngineError> {
        let req = self.client.delete(
            self.url(&format!("/channels/{}", urlencoding::encode(channel_id))),
        );
        self.send(req).await?;
        Ok(())
    }

    async fn create_bridge(&self, bridge_id: &str) -> Result<(), EngineError> {
        let req = self
            .client
            .post(
                self.url(&format!("/bridges/{}", urlencoding::encode(bridge_id))),
            )
            .query(&[("type", "mixing")]);
        self.send(req).await?;
        Ok(())
    }

    async fn add_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> Result<(), EngineError> {
        let req = self
            .client
            .post(self.url(&format!(
                "/bridges/{}/addChannel",
                urlencoding::encode(bridge_id)
            )))
            .query(&[("channel", channel_id)]);
        self.send(req).await?;
        Ok(())
    }
}
