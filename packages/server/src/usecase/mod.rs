//! UseCase 層
//!
//! ゲートウェイが受け付ける操作。ストアの具体的な実装は知らない。

mod seed_settings;
mod store_gateway;

pub use seed_settings::SeedStreamSettingsUseCase;
pub use store_gateway::StoreGatewayUseCase;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use carrera_realtime::domain::{Filter, Query, Record, RecordStore, StoreError};
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl RecordStore for Store {
            async fn fetch_one(&self, table: &str, filter: Option<Filter>) -> Result<Record, StoreError>;
            async fn fetch_many(&self, table: &str, query: Query) -> Result<Vec<Record>, StoreError>;
            async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;
            async fn update(&self, table: &str, filter: Filter, patch: Record) -> Result<(), StoreError>;
            async fn delete(&self, table: &str, filter: Filter) -> Result<(), StoreError>;
        }
    }
}
