//! Conversion logic between DTOs and domain types.

use crate::domain::{ChangeEvent, Filter, StoreError};
use crate::infrastructure::dto::{http as http_dto, websocket as ws_dto};

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<http_dto::FilterDto> for Filter {
    type Error = StoreError;

    fn try_from(dto: http_dto::FilterDto) -> Result<Self, Self::Error> {
        match dto.op.as_str() {
            "eq" => Ok(Filter::eq(&dto.column, dto.value)),
            "neq" => Ok(Filter::neq(&dto.column, dto.value)),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown filter operator '{}'",
                other
            ))),
        }
    }
}

impl From<ws_dto::ChangeEventDto> for ChangeEvent {
    fn from(dto: ws_dto::ChangeEventDto) -> Self {
        Self {
            table: dto.table,
            kind: dto.event_type,
            new: dto.new,
            old: dto.old,
        }
    }
}

impl From<http_dto::ErrorResponse> for StoreError {
    fn from(dto: http_dto::ErrorResponse) -> Self {
        match dto.code.as_str() {
            "not_found" => Self::NotFound(dto.message),
            "multiple_rows" => Self::MultipleRows(dto.message),
            "invalid_record" => Self::InvalidRecord(dto.message),
            "decode" => Self::Decode(dto.message),
            _ => Self::Transport(dto.message),
        }
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<Filter> for http_dto::FilterDto {
    fn from(filter: Filter) -> Self {
        let (op, column, value) = match filter {
            Filter::Eq { column, value } => ("eq", column, value),
            Filter::Neq { column, value } => ("neq", column, value),
        };
        Self {
            op: op.to_string(),
            column,
            value,
        }
    }
}

impl From<ChangeEvent> for ws_dto::ChangeEventDto {
    fn from(event: ChangeEvent) -> Self {
        Self {
            table: event.table,
            event_type: event.kind,
            new: event.new,
            old: event.old,
        }
    }
}

/// ストアのエラーをコードと対象（テーブル名など）に分解する
impl From<&StoreError> for http_dto::ErrorResponse {
    fn from(error: &StoreError) -> Self {
        let (code, subject) = match error {
            StoreError::NotFound(s) => ("not_found", s),
            StoreError::MultipleRows(s) => ("multiple_rows", s),
            StoreError::InvalidRecord(s) => ("invalid_record", s),
            StoreError::Decode(s) => ("decode", s),
            StoreError::Transport(s) => ("transport", s),
        };
        Self {
            code: code.to_string(),
            message: subject.clone(),
        }
    }
}
