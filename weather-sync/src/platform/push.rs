//! Push stream of platform property changes.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::ChangeNotification;
use crate::{Error, Result};

/// Notifications in arrival order. An `Err` item or the end of the stream
/// means the connection is gone.
pub type NotificationStream = BoxStream<'static, Result<ChangeNotification>>;

#[async_trait]
pub trait PushSource: Send + Sync {
    async fn connect(&self) -> Result<NotificationStream>;
}

/// WebSocket subscription to the platform's data listener.
pub struct WebSocketPushSource {
    url: String,
    api_token: String,
}

impl WebSocketPushSource {
    pub fn new(url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl PushSource for WebSocketPushSource {
    async fn connect(&self) -> Result<NotificationStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::config(format!("invalid listener url: {e}")))?;
        let key = HeaderValue::from_str(&self.api_token)
            .map_err(|e| Error::config(format!("API_TOKEN is not a valid header value: {e}")))?;
        request.headers_mut().insert("X-API-Key", key);

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::transient(format!("listener connect failed: {e}")))?;
        info!(url = %self.url, "Connected to platform data listener");

        let stream = ws_stream.filter_map(|message| async move { decode_frame(message) });
        Ok(stream.boxed())
    }
}

fn decode_frame(
    message: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<ChangeNotification>> {
    match message {
        Ok(Message::Text(text)) => decode_payload(text.as_bytes()),
        Ok(Message::Binary(bytes)) => decode_payload(&bytes),
        Ok(Message::Close(frame)) => Some(Err(Error::transient(format!(
            "listener closed by server: {frame:?}"
        )))),
        Ok(_) => None,
        Err(e) => Some(Err(Error::transient(format!("listener transport error: {e}")))),
    }
}

fn decode_payload(bytes: &[u8]) -> Option<Result<ChangeNotification>> {
    match serde_json::from_slice::<ChangeNotification>(bytes) {
        Ok(notification) => {
            debug!(asset_id = notification.asset_id, "Received change notification");
            Some(Ok(notification))
        }
        Err(e) => {
            warn!(error = %e, "Skipping undecodable listener frame");
            None
        }
    }
}
