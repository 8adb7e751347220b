//! WebSocket transport for the alert stream

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::hub::Subscriber;

/// Write half of an upgraded connection, registered with the hub
pub struct WebSocketSubscriber {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Subscriber for WebSocketSubscriber {
    async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await?;
        Ok(())
    }
}

/// WebSocket upgrade handler
///
/// GET /ws/alerts
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Register the connection once the handshake is done and keep it until the
/// client goes away
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let (sender, mut receiver) = socket.split();

    let subscriber = Arc::new(WebSocketSubscriber {
        sink: Mutex::new(sender),
    });
    let id = state.hub.subscribe(subscriber).await;
    info!("alert stream client {id} connected");

    // Inbound frames carry nothing for us; pong replies are sent by axum
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Ping(_) => debug!("received ping from client {id}"),
            _ => {}
        }
    }

    state.hub.unsubscribe(id).await;
    info!("alert stream client {id} disconnected");
}
