//! ゲートウェイの REST エンドポイントを呼び出すレコードストア
//!
//! `POST {base_url}/rest/{table}/{select|insert|update|delete}` に JSON を送る。
//! エラー応答は `ErrorResponse` として受け取り、`StoreError` に戻す。

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    domain::{Filter, Query, Record, RecordStore, StoreError},
    infrastructure::dto::http::{
        AckResponse, DeleteRequest, ErrorResponse, InsertRequest, InsertResponse, SelectRequest,
        SelectResponse, UpdateRequest,
    },
};

/// HTTP 経由のレコードストア
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRecordStore {
    /// `base_url` は `http://127.0.0.1:8080` の形式（末尾の `/` は除く）
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, table: &str, operation: &str) -> String {
        format!("{}/rest/{}/{}", self.base_url, table, operation)
    }

    async fn post<Req, Res>(
        &self,
        table: &str,
        operation: &str,
        body: &Req,
    ) -> Result<Res, StoreError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(table, operation);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Res>()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()));
        }

        match response.json::<ErrorResponse>().await {
            Ok(error) => Err(error.into()),
            Err(_) => Err(StoreError::Transport(format!("{} returned {}", url, status))),
        }
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn fetch_one(&self, table: &str, filter: Option<Filter>) -> Result<Record, StoreError> {
        let request = SelectRequest {
            filter: filter.map(Into::into),
            single: true,
            ..SelectRequest::default()
        };
        let response: SelectResponse = self.post(table, "select", &request).await?;

        let mut rows = response.rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row),
            (None, _) => Err(StoreError::NotFound(table.to_string())),
            (Some(_), Some(_)) => Err(StoreError::MultipleRows(table.to_string())),
        }
    }

    async fn fetch_many(&self, table: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        let request = SelectRequest {
            filter: query.filter.map(Into::into),
            order_by: Some(query.order_by),
            ascending: query.ascending,
            limit: query.limit,
            single: false,
        };
        let response: SelectResponse = self.post(table, "select", &request).await?;
        Ok(response.rows)
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let response: InsertResponse = self
            .post(table, "insert", &InsertRequest { record })
            .await?;
        Ok(response.record)
    }

    async fn update(&self, table: &str, filter: Filter, patch: Record) -> Result<(), StoreError> {
        let request = UpdateRequest {
            filter: filter.into(),
            patch,
        };
        let _: AckResponse = self.post(table, "update", &request).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filter: Filter) -> Result<(), StoreError> {
        let request = DeleteRequest {
            filter: filter.into(),
        };
        let _: AckResponse = self.post(table, "delete", &request).await?;
        Ok(())
    }
}
