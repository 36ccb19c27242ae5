//! WebSocket change feed handler.
//!
//! Each connection keeps its own set of joined topics. Every join is answered
//! with a `SUBSCRIBED` status frame; from then on every change event of the
//! in-memory feed is relayed to that topic until the client leaves it.

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use carrera_realtime::{
    domain::{ChangeEvent, SubscribeStatus},
    infrastructure::dto::websocket::{ClientFrame, ServerFrame},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};

use crate::ui::state::AppState;

pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that encodes frames from the rx channel and pushes them to the WebSocket sender.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<ServerFrame>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    })
}

/// 参加中のトピック
#[derive(Debug, Default)]
struct Subscriptions {
    topics: HashSet<String>,
}

impl Subscriptions {
    /// クライアントのフレームを処理し、返すべきフレームを返す
    fn apply(&mut self, frame: ClientFrame) -> Option<ServerFrame> {
        match frame {
            ClientFrame::Join { topic } => {
                tracing::info!("Client joined '{}'", topic);
                self.topics.insert(topic.clone());
                Some(ServerFrame::Status {
                    topic,
                    status: SubscribeStatus::Subscribed,
                })
            }
            ClientFrame::Leave { topic } => {
                if self.topics.remove(&topic) {
                    tracing::info!("Client left '{}'", topic);
                }
                None
            }
        }
    }

    /// 参加中の全トピック宛ての変更フレーム
    fn relay(&self, event: &ChangeEvent) -> Vec<ServerFrame> {
        self.topics
            .iter()
            .map(|topic| ServerFrame::Change {
                topic: topic.clone(),
                event: event.clone().into(),
            })
            .collect()
    }

    /// 取りこぼしがあった場合、全トピックを失敗として閉じる
    fn fail_all(&mut self) -> Vec<ServerFrame> {
        self.topics
            .drain()
            .map(|topic| ServerFrame::Status {
                topic,
                status: SubscribeStatus::ChannelError,
            })
            .collect()
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut changes = state.feed.subscribe_all();

    let mut relay_task = tokio::spawn(async move {
        let mut subscriptions = Subscriptions::default();
        loop {
            let frames = tokio::select! {
                message = receiver.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => subscriptions.apply(frame).into_iter().collect(),
                            Err(e) => {
                                tracing::warn!("Ignoring malformed frame: {}", e);
                                Vec::new()
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Realtime client disconnected");
                        break;
                    }
                    Some(Ok(_)) => Vec::new(),
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                },
                change = changes.recv() => match change {
                    Ok(event) => subscriptions.relay(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Realtime client lagged behind by {} event(s)", skipped);
                        subscriptions.fail_all()
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            for frame in frames {
                if tx.send(frame).is_err() {
                    return;
                }
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut relay_task => send_task.abort(),
        _ = &mut send_task => relay_task.abort(),
    };
}
