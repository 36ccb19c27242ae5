//! Server state shared by the handlers.

use std::sync::Arc;

use carrera_realtime::infrastructure::feed::InMemoryChangeFeed;

use crate::usecase::StoreGatewayUseCase;

/// Shared application state
pub struct AppState {
    /// StoreGatewayUseCase（REST 経由のストア操作）
    pub store_gateway: Arc<StoreGatewayUseCase>,
    /// 変更フィード（`/realtime` の購読者に中継する）
    pub feed: InMemoryChangeFeed,
}
