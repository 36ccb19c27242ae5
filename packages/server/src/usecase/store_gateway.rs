//! UseCase: REST 経由のストア操作
//!
//! HTTP の要求 DTO をドメインの条件に変換し、レコードストアを呼び出す。
//! 変更イベントの発行はストア側（インメモリ実装）が行う。

use std::sync::Arc;

use carrera_realtime::{
    domain::{Filter, Query, RecordStore, StoreError},
    infrastructure::dto::http::{
        AckResponse, DeleteRequest, InsertRequest, InsertResponse, SelectRequest, SelectResponse,
        UpdateRequest,
    },
};

/// 並び順の指定がないときに使う列
const DEFAULT_ORDER_COLUMN: &str = "id";

/// ストア操作のユースケース
pub struct StoreGatewayUseCase {
    store: Arc<dyn RecordStore>,
}

impl StoreGatewayUseCase {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 行を読む
    ///
    /// `single` の場合は 1 行だけを期待し、0 行なら `NotFound`、複数行なら
    /// `MultipleRows` を返す。
    pub async fn select(
        &self,
        table: &str,
        request: SelectRequest,
    ) -> Result<SelectResponse, StoreError> {
        let filter = request.filter.map(Filter::try_from).transpose()?;

        if request.single {
            let row = self.store.fetch_one(table, filter).await?;
            return Ok(SelectResponse { rows: vec![row] });
        }

        let order_by = request.order_by.as_deref().unwrap_or(DEFAULT_ORDER_COLUMN);
        let mut query = Query::ordered_by(order_by, request.ascending);
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        if let Some(limit) = request.limit {
            query = query.limit(limit);
        }

        let rows = self.store.fetch_many(table, query).await?;
        tracing::debug!("select {}: {} row(s)", table, rows.len());
        Ok(SelectResponse { rows })
    }

    pub async fn insert(
        &self,
        table: &str,
        request: InsertRequest,
    ) -> Result<InsertResponse, StoreError> {
        let record = self.store.insert(table, request.record).await?;
        Ok(InsertResponse { record })
    }

    pub async fn update(
        &self,
        table: &str,
        request: UpdateRequest,
    ) -> Result<AckResponse, StoreError> {
        let filter = Filter::try_from(request.filter)?;
        self.store.update(table, filter, request.patch).await?;
        Ok(AckResponse::ok())
    }

    pub async fn delete(
        &self,
        table: &str,
        request: DeleteRequest,
    ) -> Result<AckResponse, StoreError> {
        let filter = Filter::try_from(request.filter)?;
        self.store.delete(table, filter).await?;
        Ok(AckResponse::ok())
    }
}
