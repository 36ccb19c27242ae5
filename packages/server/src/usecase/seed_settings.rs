//! UseCase: 配信設定の初期行を用意する
//!
//! 配信設定のテーブルは 1 行だけを持つ前提で読まれるため、起動時に空なら
//! 代替設定と同じ内容の行を 1 行入れておく。すでに行があれば何もしない。

use std::sync::Arc;

use carrera_realtime::domain::{
    Query, RecordStore, STREAM_SETTINGS_TABLE, StoreError, StreamSettings,
};
use carrera_shared::time::Clock;

/// 配信設定の初期行を用意するユースケース
pub struct SeedStreamSettingsUseCase {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl SeedStreamSettingsUseCase {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 初期行を用意する
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - 行を追加した
    /// * `Ok(false)` - すでに行があった
    pub async fn execute(&self, title: Option<String>) -> Result<bool, StoreError> {
        let existing = self
            .store
            .fetch_many(STREAM_SETTINGS_TABLE, Query::ordered_by("id", true).limit(1))
            .await?;
        if !existing.is_empty() {
            tracing::debug!("Stream settings already present, skipping seed");
            return Ok(false);
        }

        let mut settings = StreamSettings::fallback(self.clock.now());
        if let Some(title) = title {
            settings.stream_title = Some(title);
        }
        let record = serde_json::to_value(&settings)
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        self.store.insert(STREAM_SETTINGS_TABLE, record).await?;

        tracing::info!("Seeded stream settings (id={})", settings.id);
        Ok(true)
    }
}
