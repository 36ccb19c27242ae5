//! HTTP DTOs for the record store endpoints (`POST /rest/{table}/{operation}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 行の絞り込み条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDto {
    /// `eq` または `neq`
    pub op: String,
    pub column: String,
    pub value: Value,
}

/// `select` の要求
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub filter: Option<FilterDto>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    /// 1 行だけを期待する（0 行・複数行はエラー）
    #[serde(default)]
    pub single: bool,
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectResponse {
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResponse {
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub filter: FilterDto,
    pub patch: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub filter: FilterDto,
}

/// 更新・削除の応答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// エラー応答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `not_found`, `multiple_rows`, `invalid_record`, `decode`, `transport`
    pub code: String,
    pub message: String,
}
