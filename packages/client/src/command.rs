//! Console command parsing.
//!
//! Lines starting with `/` are commands; anything else is sent as a chat
//! message.

use crate::error::ClientError;

pub const HELP: &str = "\
/live on|off        配信の開始・停止
/url [URL]          再生 URL を設定（省略で削除）
/title [TEXT]       配信タイトルを設定（省略で削除）
/clear              チャットを全削除
/refresh            設定とメッセージを取得し直す
/reconnect          両方のチャンネルを再接続
/disconnect         両方のチャンネルを切断
/pause              一覧の末尾から離れる（新着は件数だけ表示）
/bottom             一覧の末尾に戻る
/drop               チャンネルの切断を発生させる（--local のみ）
/outage on|off      ハンドシェイクを拒否させる（--local のみ）
/diag               接続診断
/status             接続状態を表示
/help               このヘルプ
/quit               終了";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// チャットに送るテキスト
    Send(String),
    Live(bool),
    Url(Option<String>),
    Title(Option<String>),
    Clear,
    Refresh,
    Reconnect,
    Disconnect,
    Pause,
    Bottom,
    Drop,
    Outage(bool),
    Diag,
    Status,
    Help,
    Quit,
}

impl Command {
    /// 1 行を解釈する（空行は `None`）
    pub fn parse(line: &str) -> Result<Option<Self>, ClientError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, Some(argument.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        let command = match name {
            "live" => Self::Live(parse_switch(argument, "/live on|off")?),
            "url" => Self::Url(argument.map(str::to_string)),
            "title" => Self::Title(argument.map(str::to_string)),
            "clear" => Self::Clear,
            "refresh" => Self::Refresh,
            "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect,
            "pause" => Self::Pause,
            "bottom" => Self::Bottom,
            "drop" => Self::Drop,
            "outage" => Self::Outage(parse_switch(argument, "/outage on|off")?),
            "diag" => Self::Diag,
            "status" => Self::Status,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => return Err(ClientError::UnknownCommand(format!("/{}", name))),
        };
        Ok(Some(command))
    }
}

fn parse_switch(argument: Option<&str>, usage: &'static str) -> Result<bool, ClientError> {
    match argument {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(ClientError::Usage(usage)),
    }
}
