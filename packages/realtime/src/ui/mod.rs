//! UI 層
//!
//! 接続状態を利用者向けの表示に変換するプレゼンター。描画そのものは利用側が行う。

pub mod presenter;

pub use presenter::{
    RETRY_LABEL, StatusIcon, StatusIndicator, StatusPresenter, StatusTone, format_last_connected,
};
