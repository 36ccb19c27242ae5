//! インメモリのレコードストア
//!
//! テーブル名ごとに行（JSON オブジェクト）を保持する。書き込みのたびに
//! 変更フィードへ INSERT / UPDATE / DELETE イベントを発行する。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use carrera_shared::time::{Clock, SystemClock};

use crate::{
    domain::{ChangeEvent, Filter, Query, Record, RecordStore, StoreError, store::compare_values},
    infrastructure::feed::InMemoryChangeFeed,
};

/// インメモリのレコードストア
///
/// クローンは同じテーブルを共有する。
#[derive(Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<Mutex<HashMap<String, Vec<Record>>>>,
    feed: Option<InMemoryChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// 変更イベントを発行しないストアを作成
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            feed: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// 書き込みを `feed` に発行するストアを作成
    pub fn with_feed(feed: InMemoryChangeFeed) -> Self {
        Self {
            feed: Some(feed),
            ..Self::new()
        }
    }

    /// タイムスタンプに使う時計を差し替える
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// テーブルの行数
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, Vec::len)
    }

    fn timestamp(&self) -> Value {
        Value::String(
            self.clock
                .now()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        if let Some(feed) = &self.feed {
            for event in events {
                feed.publish(event);
            }
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_one(&self, table: &str, filter: Option<Filter>) -> Result<Record, StoreError> {
        let tables = self.tables.lock();
        let mut rows = tables
            .get(table)
            .into_iter()
            .flatten()
            .filter(|row| filter.as_ref().is_none_or(|f| f.matches(row)));

        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row.clone()),
            (None, _) => Err(StoreError::NotFound(table.to_string())),
            (Some(_), Some(_)) => Err(StoreError::MultipleRows(table.to_string())),
        }
    }

    async fn fetch_many(&self, table: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        let mut rows: Vec<Record> = {
            let tables = self.tables.lock();
            tables
                .get(table)
                .into_iter()
                .flatten()
                .filter(|row| query.filter.as_ref().is_none_or(|f| f.matches(row)))
                .cloned()
                .collect()
        };

        let column = query.order_by.as_str();
        rows.sort_by(|a, b| {
            compare_values(
                a.get(column).unwrap_or(&Value::Null),
                b.get(column).unwrap_or(&Value::Null),
            )
        });
        if !query.ascending {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let Value::Object(mut row) = record else {
            return Err(StoreError::InvalidRecord(
                "record must be a JSON object".to_string(),
            ));
        };
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        if !row.contains_key("created_at") {
            row.insert("created_at".to_string(), self.timestamp());
        }
        let row = Value::Object(row);

        {
            let mut tables = self.tables.lock();
            let rows = tables.entry(table.to_string()).or_default();
            if rows.iter().any(|existing| existing.get("id") == row.get("id")) {
                return Err(StoreError::InvalidRecord(format!(
                    "duplicate id in {}",
                    table
                )));
            }
            rows.push(row.clone());
        }

        self.publish(vec![ChangeEvent::insert(table, row.clone())]);
        Ok(row)
    }

    async fn update(&self, table: &str, filter: Filter, patch: Record) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord(
                "patch must be a JSON object".to_string(),
            ));
        };
        let updated_at = self.timestamp();

        let events = {
            let mut tables = self.tables.lock();
            let mut events = Vec::new();
            for row in tables.entry(table.to_string()).or_default().iter_mut() {
                if !filter.matches(row) {
                    continue;
                }
                let old = row.clone();
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                    fields.insert("updated_at".to_string(), updated_at.clone());
                }
                events.push(ChangeEvent::update(table, old, row.clone()));
            }
            events
        };

        tracing::debug!("Updated {} row(s) in {}", events.len(), table);
        self.publish(events);
        Ok(())
    }

    async fn delete(&self, table: &str, filter: Filter) -> Result<(), StoreError> {
        let removed: Vec<Record> = {
            let mut tables = self.tables.lock();
            let rows = tables.entry(table.to_string()).or_default();
            let (removed, kept): (Vec<Record>, Vec<Record>) = rows.drain(..).partition(|row| filter.matches(row));
            *rows = kept;
            removed
        };

        tracing::debug!("Deleted {} row(s) from {}", removed.len(), table);
        self.publish(
            removed
                .into_iter()
                .map(|row| ChangeEvent::delete(table, row))
                .collect(),
        );
        Ok(())
    }
}
