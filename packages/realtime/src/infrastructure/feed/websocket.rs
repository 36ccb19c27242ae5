//! ゲートウェイの `/realtime` エンドポイントに接続する変更フィード
//!
//! 1 本の WebSocket 接続（リンク）を全チャンネルで共有する。リンクは最初の
//! `subscribe` で張られ、切れた場合は購読中の全チャンネルに `CHANNEL_ERROR` を
//! 通知して破棄する。再接続は各チャンネルの接続マネージャーに任せる。

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::listener::ChannelCore;
use crate::{
    domain::{
        ChangeCallback, ChangeEvent, ChangeFeed, ChannelHandle, EventFilter, FeedError,
        StatusCallback, SubscribeStatus,
    },
    infrastructure::dto::websocket::{ClientFrame, ServerFrame},
};

struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

struct WsState {
    link: Option<Link>,
    next_link_id: u64,
    channels: HashMap<String, Arc<WsChannel>>,
}

struct WsInner {
    url: String,
    state: Mutex<WsState>,
}

impl WsInner {
    /// リンク経由でフレームを送る（リンクがなければ張る）
    fn send(self: &Arc<Self>, frame: ClientFrame) {
        let mut state = self.state.lock();
        if let Some(link) = &state.link
            && link.outbound.send(frame.clone()).is_ok()
        {
            return;
        }

        let id = state.next_link_id;
        state.next_link_id += 1;
        let (outbound, rx) = mpsc::unbounded_channel();
        // 接続が確立するまでキューに溜まる
        let _ = outbound.send(frame);
        state.link = Some(Link { id, outbound });
        tokio::spawn(run_link(Arc::downgrade(self), self.url.clone(), id, rx));
    }

    /// リンクがある場合だけフレームを送る
    fn send_if_linked(&self, frame: ClientFrame) {
        if let Some(link) = &self.state.lock().link {
            let _ = link.outbound.send(frame);
        }
    }

    fn channel(&self, topic: &str) -> Option<Arc<WsChannel>> {
        self.state.lock().channels.get(topic).cloned()
    }

    /// リンクが切れた（`id` が現在のリンクの場合だけ破棄する）
    fn drop_link(&self, id: u64) {
        let channels: Vec<Arc<WsChannel>> = {
            let mut state = self.state.lock();
            if state.link.as_ref().is_some_and(|link| link.id == id) {
                state.link = None;
            }
            state.channels.values().cloned().collect()
        };
        for channel in channels {
            channel.core.notify_status(SubscribeStatus::ChannelError);
        }
    }
}

/// WebSocket 経由の変更フィード
#[derive(Clone)]
pub struct WsChangeFeed {
    inner: Arc<WsInner>,
}

impl WsChangeFeed {
    /// `url` は `ws://127.0.0.1:8080/realtime` の形式
    pub fn new(url: &str) -> Self {
        Self {
            inner: Arc::new(WsInner {
                url: url.to_string(),
                state: Mutex::new(WsState {
                    link: None,
                    next_link_id: 0,
                    channels: HashMap::new(),
                }),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// リンクが張られているか
    pub fn is_linked(&self) -> bool {
        self.inner.state.lock().link.is_some()
    }
}

impl ChangeFeed for WsChangeFeed {
    fn open_channel(&self, topic: &str) -> Result<Arc<dyn ChannelHandle>, FeedError> {
        let mut state = self.inner.state.lock();
        if state.channels.contains_key(topic) {
            return Err(FeedError::TopicInUse(topic.to_string()));
        }
        let channel = Arc::new(WsChannel {
            core: ChannelCore::new(topic),
            feed: Arc::downgrade(&self.inner),
        });
        state.channels.insert(topic.to_string(), channel.clone());
        Ok(channel)
    }

    fn release_channel(&self, handle: &Arc<dyn ChannelHandle>) {
        let removed = {
            let mut state = self.inner.state.lock();
            let same = state.channels.get(handle.topic()).is_some_and(|channel| {
                std::ptr::addr_eq(Arc::as_ptr(channel), Arc::as_ptr(handle))
            });
            if same {
                state.channels.remove(handle.topic())
            } else {
                None
            }
        };

        if let Some(channel) = removed {
            channel.leave();
            tracing::debug!("Channel released: {}", channel.core.topic());
        }
    }
}

struct WsChannel {
    core: ChannelCore,
    feed: Weak<WsInner>,
}

impl WsChannel {
    fn leave(&self) {
        if self.core.close()
            && let Some(feed) = self.feed.upgrade()
        {
            feed.send_if_linked(ClientFrame::Leave {
                topic: self.core.topic().to_string(),
            });
        }
    }
}

impl ChannelHandle for WsChannel {
    fn topic(&self) -> &str {
        self.core.topic()
    }

    fn on_change(&self, table: &str, event: EventFilter, callback: ChangeCallback) {
        self.core.add_listener(table, event, callback);
    }

    fn off(&self, table: &str, event: EventFilter) {
        self.core.remove_listeners(table, event);
    }

    fn subscribe(&self, callback: StatusCallback) {
        self.core.begin_join(callback);
        match self.feed.upgrade() {
            Some(feed) => feed.send(ClientFrame::Join {
                topic: self.core.topic().to_string(),
            }),
            None => self.core.notify_status(SubscribeStatus::ChannelError),
        }
    }

    fn unsubscribe(&self) {
        self.leave();
    }
}

/// リンク 1 本分の送受信
async fn run_link(
    feed: Weak<WsInner>,
    url: String,
    id: u64,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
) {
    let ws_stream = match connect_async(&url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::warn!("Failed to connect to {}: {}", url, e);
            if let Some(feed) = feed.upgrade() {
                feed.drop_link(id);
            }
            return;
        }
    };
    tracing::info!("Realtime link {} established: {}", id, url);

    let (mut write, mut read) = ws_stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    let reader_feed = feed.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    tracing::info!("Gateway closed the realtime link");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Realtime link read error: {}", e);
                    break;
                }
            };

            let frame = match serde_json::from_str::<ServerFrame>(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Ignoring malformed frame: {}", e);
                    continue;
                }
            };
            let Some(feed) = reader_feed.upgrade() else {
                break;
            };
            match frame {
                ServerFrame::Status { topic, status } => {
                    if let Some(channel) = feed.channel(&topic) {
                        channel.core.notify_status(status);
                    }
                }
                ServerFrame::Change { topic, event } => {
                    let event: ChangeEvent = event.into();
                    if let Some(channel) = feed.channel(&topic) {
                        channel.core.dispatch(&event);
                    }
                }
            }
        }
    });

    // どちらかが終わったらもう一方も止める
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Realtime link {} closed", id);
    if let Some(feed) = feed.upgrade() {
        feed.drop_link(id);
    }
}
