//! Console session management.
//!
//! A session mounts both sync controllers on one backend, renders their state
//! changes above the prompt and executes console commands.

use std::sync::Arc;

use carrera_realtime::{
    config::RealtimeConfig,
    domain::{Filter, STREAM_SETTINGS_TABLE},
    ui::StatusPresenter,
    usecase::{
        ChatSync, ChatSyncOptions, LiveDiagnostics, ScrollEvent, ScrollRequest, SettingsSync,
        SettingsSyncOptions,
    },
};
use carrera_shared::time::Clock;
use chrono::{FixedOffset, Local};
use rustyline::{DefaultEditor, error::ReadlineError};
use serde_json::{Value, json};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};

use crate::{
    backend::Backend,
    command::{Command, HELP},
    error::ClientError,
    formatter::ConsoleFormatter,
    render::{ChatRenderer, StatusRenderer, StreamRenderer},
    ui::{PROMPT, print_lines},
};

/// 端末を一覧のスクロールコンテナに見立てたときの寸法
const VIEWPORT_HEIGHT: f64 = 600.0;
const CONTENT_HEIGHT: f64 = 10_000.0;

/// 末尾を見ている位置
const AT_BOTTOM: ScrollEvent = ScrollEvent {
    scroll_top: CONTENT_HEIGHT - VIEWPORT_HEIGHT,
    scroll_height: CONTENT_HEIGHT,
    client_height: VIEWPORT_HEIGHT,
};

/// 先頭まで戻った位置
const AT_TOP: ScrollEvent = ScrollEvent {
    scroll_top: 0.0,
    scroll_height: CONTENT_HEIGHT,
    client_height: VIEWPORT_HEIGHT,
};

/// Console options
#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    pub config: RealtimeConfig,
    /// 投稿者名（省略時は "Admin"）
    pub author: Option<String>,
    /// 管理者用チャンネルと件数上限を使う
    pub admin: bool,
    pub message_limit: Option<usize>,
}

/// コマンド実行の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 表示する行
    Continue(Vec<String>),
    Quit,
}

pub struct ConsoleSession {
    backend: Backend,
    settings: SettingsSync,
    chat: ChatSync,
    clock: Arc<dyn Clock>,
    author: Option<String>,
}

impl ConsoleSession {
    pub fn new(backend: Backend, options: ConsoleOptions, clock: Arc<dyn Clock>) -> Self {
        let mut chat_options = if options.admin {
            ChatSyncOptions::admin(&options.config)
        } else {
            ChatSyncOptions::from_config(&options.config)
        };
        if let Some(limit) = options.message_limit {
            chat_options = chat_options.with_message_limit(limit);
        }

        let settings = SettingsSync::new(
            SettingsSyncOptions::from_config(&options.config),
            backend.store.clone(),
            backend.feed.clone(),
            clock.clone(),
        );
        let chat = ChatSync::new(
            chat_options,
            backend.store.clone(),
            backend.feed.clone(),
            clock.clone(),
        );

        Self {
            backend,
            settings,
            chat,
            clock,
            author: options.author,
        }
    }

    pub fn settings(&self) -> &SettingsSync {
        &self.settings
    }

    pub fn chat(&self) -> &ChatSync {
        &self.chat
    }

    /// 両方のコントローラーを起動する
    pub async fn start(&self) {
        tokio::join!(self.settings.activate(), self.chat.activate());
    }

    pub async fn stop(&self) {
        tokio::join!(self.settings.deactivate(), self.chat.deactivate());
    }

    /// コマンドを 1 つ実行する
    pub async fn execute(&self, command: Command) -> Result<Outcome, ClientError> {
        let lines = match command {
            Command::Send(text) => {
                let message = self.chat.send_message(self.author.as_deref(), &text).await?;
                tracing::debug!("Message {} sent", message.id);
                Vec::new()
            }
            Command::Live(live) => {
                self.update_settings(json!({"is_live": live})).await?;
                Vec::new()
            }
            Command::Url(url) => {
                self.update_settings(json!({"iframe_url": url})).await?;
                Vec::new()
            }
            Command::Title(title) => {
                self.update_settings(json!({"stream_title": title})).await?;
                Vec::new()
            }
            Command::Clear => {
                self.chat.clear_messages().await?;
                Vec::new()
            }
            Command::Refresh => {
                tokio::join!(
                    self.settings.refresh_settings(),
                    self.chat.refresh_messages()
                );
                vec![ConsoleFormatter::format_stream(&self.settings.view())]
            }
            Command::Reconnect => {
                tokio::join!(self.settings.reconnect(), self.chat.reconnect());
                Vec::new()
            }
            Command::Disconnect => {
                self.stop().await;
                Vec::new()
            }
            Command::Pause => {
                self.chat.handle_scroll(AT_TOP);
                vec!["[Chat] En pausa: los mensajes nuevos solo se cuentan".to_string()]
            }
            Command::Bottom => {
                self.chat.scroll_to_bottom_manually();
                Vec::new()
            }
            Command::Drop => {
                let topics = [
                    self.settings.connection().channel_name(),
                    self.chat.connection().channel_name(),
                ];
                let dropped = self
                    .backend
                    .drop_channels(&topics)
                    .ok_or(ClientError::LocalOnly("/drop"))?;
                vec![format!("Dropped {} channel(s)", dropped)]
            }
            Command::Outage(outage) => {
                if !self.backend.set_outage(outage) {
                    return Err(ClientError::LocalOnly("/outage"));
                }
                if outage {
                    let topics = [
                        self.settings.connection().channel_name(),
                        self.chat.connection().channel_name(),
                    ];
                    self.backend.drop_channels(&topics);
                    vec!["Outage started: handshakes are rejected".to_string()]
                } else {
                    vec!["Outage over: use /reconnect".to_string()]
                }
            }
            Command::Diag => {
                let diagnostics =
                    LiveDiagnostics::new(self.backend.store.clone(), self.backend.feed.clone());
                ConsoleFormatter::format_diagnostics(&diagnostics.run().await)
            }
            Command::Status => self.status_lines(),
            Command::Help => HELP.lines().map(str::to_string).collect(),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(lines))
    }

    /// 接続状態と配信設定の現在値
    pub fn status_lines(&self) -> Vec<String> {
        let now = self.clock.now();
        let presenter = StatusPresenter::new();
        let mut lines = vec![format!("Backend: {}", self.backend.describe())];
        lines.extend(
            StatusRenderer::new("Stream", presenter).render(&self.settings.connection_state(), now),
        );
        lines.extend(
            StatusRenderer::new("Chat", presenter).render(&self.chat.connection_state(), now),
        );
        lines.push(ConsoleFormatter::format_stream(&self.settings.view()));
        let chat = self.chat.view();
        lines.push(format!(
            "[Chat] {} mensaje(s), {} sin leer",
            chat.messages.len(),
            chat.new_message_count
        ));
        lines
    }

    async fn update_settings(&self, patch: Value) -> Result<(), ClientError> {
        let id = self.settings.settings().map_or(1, |settings| settings.id);
        self.backend
            .store
            .update(STREAM_SETTINGS_TABLE, Filter::eq("id", id), patch)
            .await?;
        Ok(())
    }

    /// Run the interactive console until `/quit`, Ctrl+C or Ctrl+D
    pub async fn run(self) -> Result<(), ClientError> {
        println!("\nUsing {}. Type /help for commands.\n", self.backend.describe());

        self.start().await;
        let mut render_task = spawn_renderer(self.settings.clone(), self.chat.clone());

        // Create channel for rustyline input
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

        // Spawn a blocking thread for rustyline (synchronous readline)
        let _readline_handle = std::thread::spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    eprintln!("Failed to initialize readline: {}", e);
                    return;
                }
            };

            loop {
                match rl.readline(PROMPT) {
                    Ok(line) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            rl.add_history_entry(line).ok();
                            if input_tx.send(line.to_string()).is_err() {
                                break;
                            }
                        }
                    }
                    Err(ReadlineError::Interrupted) => {
                        tracing::info!("Interrupted");
                        break;
                    }
                    Err(ReadlineError::Eof) => {
                        tracing::info!("EOF");
                        break;
                    }
                    Err(err) => {
                        tracing::error!("Readline error: {}", err);
                        break;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                line = input_rx.recv() => {
                    let Some(line) = line else { break };
                    match Command::parse(&line) {
                        Ok(None) => {}
                        Ok(Some(command)) => match self.execute(command).await {
                            Ok(Outcome::Continue(lines)) => print_lines(&lines),
                            Ok(Outcome::Quit) => break,
                            Err(e) => print_lines(&[format!("error: {}", e)]),
                        },
                        Err(e) => print_lines(&[e.to_string()]),
                    }
                }
                _ = &mut render_task => {
                    tracing::warn!("Renderer stopped");
                    break;
                }
            }
        }

        render_task.abort();
        self.stop().await;
        println!();
        Ok(())
    }
}

/// 状態の変化を表示するタスク
fn spawn_renderer(settings: SettingsSync, chat: ChatSync) -> JoinHandle<()> {
    tokio::spawn(async move {
        let offset: FixedOffset = *Local::now().offset();
        let presenter = StatusPresenter::new().with_offset(offset);
        let mut chat_renderer = ChatRenderer::new(offset);
        let mut stream_renderer = StreamRenderer::default();
        let mut stream_status = StatusRenderer::new("Stream", presenter);
        let mut chat_status = StatusRenderer::new("Chat", presenter);

        let mut chat_view = chat.subscribe();
        let mut settings_view = settings.subscribe();
        let mut chat_state = chat.connection().subscribe();
        let mut stream_state = settings.connection().subscribe();
        let mut scroll = chat.scroll_requests();

        // 起動時点の状態
        let mut lines = Vec::new();
        lines.extend(stream_status.on_state(&stream_state.borrow_and_update(), chrono::Utc::now()));
        lines.extend(chat_status.on_state(&chat_state.borrow_and_update(), chrono::Utc::now()));
        lines.extend(stream_renderer.on_view(&settings_view.borrow_and_update()));
        lines.extend(chat_renderer.on_view(&chat_view.borrow_and_update(), true));
        print_lines(&lines);

        loop {
            let lines = tokio::select! {
                changed = chat_view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = chat_view.borrow_and_update().clone();
                    chat_renderer.on_view(&view, chat.scroll_tracker().is_near_bottom())
                }
                changed = settings_view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = settings_view.borrow_and_update().clone();
                    stream_renderer.on_view(&view).into_iter().collect()
                }
                changed = chat_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = chat_state.borrow_and_update().clone();
                    chat_status.on_state(&state, chrono::Utc::now())
                }
                changed = stream_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = stream_state.borrow_and_update().clone();
                    stream_status.on_state(&state, chrono::Utc::now())
                }
                request = scroll.recv() => match request {
                    Ok(ScrollRequest::ToBottom { .. }) => {
                        let lines = chat_renderer.on_scroll_to_bottom(&chat.view());
                        chat.handle_scroll(AT_BOTTOM);
                        lines
                    }
                    Err(RecvError::Lagged(_)) => Vec::new(),
                    Err(RecvError::Closed) => break,
                },
            };
            print_lines(&lines);
        }
    })
}
