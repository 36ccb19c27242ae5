//! チャットメッセージの表示ウィンドウ
//!
//! 直近 `limit` 件だけを作成日時の昇順で保持する。メッセージの同一性は ID で判定し、
//! 同じ INSERT を 2 回適用しても重複しない。

use super::record::ChatMessage;

/// INSERT の適用結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 末尾に追加された
    Appended,
    /// 同じ ID がすでに存在した（内容だけ置き換えた）
    Duplicate,
}

/// 直近 `limit` 件のメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatWindow {
    limit: usize,
    messages: Vec<ChatMessage>,
}

impl ChatWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            messages: Vec::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// 一覧を丸ごと置き換える（昇順の入力を想定、ID の重複は後勝ち）
    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages.clear();
        for message in messages {
            self.insert(message);
        }
    }

    /// 末尾に追加し、上限を超えた分を先頭（最古）から捨てる
    pub fn insert(&mut self, message: ChatMessage) -> InsertOutcome {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
            return InsertOutcome::Duplicate;
        }

        self.messages.push(message);
        if self.messages.len() > self.limit {
            let overflow = self.messages.len() - self.limit;
            self.messages.drain(..overflow);
        }
        InsertOutcome::Appended
    }

    /// 同じ ID のメッセージをその場で置き換える（存在しなければ何もしない）
    pub fn update(&mut self, message: ChatMessage) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message;
                true
            }
            None => false,
        }
    }

    /// ID が一致するメッセージを削除（存在しなければ何もしない）
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
