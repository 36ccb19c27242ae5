//! レコードストアのインターフェース
//!
//! フィルタ・並び順・件数指定つきの問い合わせと、挿入・更新・削除を提供する
//! 外部コラボレーター。行は JSON オブジェクトとして扱います。

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::error::StoreError;

/// ストア上の 1 行
pub type Record = Value;

/// 行のフィルタ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Filter {
    Eq { column: String, value: Value },
    Neq { column: String, value: Value },
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Self::Neq {
            column: column.to_string(),
            value: value.into(),
        }
    }

    /// 行がフィルタに一致するか（列が存在しない場合は `null` として比較）
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Eq { column, value } => record.get(column).unwrap_or(&Value::Null) == value,
            Self::Neq { column, value } => record.get(column).unwrap_or(&Value::Null) != value,
        }
    }
}

/// 複数行の問い合わせ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: Option<Filter>,
    pub order_by: String,
    pub ascending: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn ordered_by(column: &str, ascending: bool) -> Self {
        Self {
            filter: None,
            order_by: column.to_string(),
            ascending,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// レコードストア
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 1 行を取得（0 行なら `NotFound`、複数行なら `MultipleRows`）
    async fn fetch_one(&self, table: &str, filter: Option<Filter>) -> Result<Record, StoreError>;

    /// 並び順・件数を指定して複数行を取得
    async fn fetch_many(&self, table: &str, query: Query) -> Result<Vec<Record>, StoreError>;

    /// 1 行を挿入し、ストアが補完した行を返す
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;

    /// フィルタに一致する行に `patch` の列を上書き
    async fn update(&self, table: &str, filter: Filter, patch: Record) -> Result<(), StoreError>;

    /// フィルタに一致する行を削除
    async fn delete(&self, table: &str, filter: Filter) -> Result<(), StoreError>;
}

/// 行をドメインモデルに変換
pub fn decode_record<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    serde_json::from_value(record).map_err(|e| StoreError::Decode(e.to_string()))
}

/// 列の値を比較（RFC 3339 の文字列は時刻として比較する）
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}
