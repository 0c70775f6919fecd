//! 业务能力层
//!
//! - `viewer_bridge`：阅读器生命周期、选区捕获、翻页
//! - `document_switcher`：结果阶段的当前文档切换

pub mod document_switcher;
pub mod viewer_bridge;

pub use document_switcher::{ActiveDocumentSwitcher, SwitchDecision, SwitchOutcome};
pub use viewer_bridge::{
    DocumentSource, NavigationHandle, OpenRequest, RenderEngine, ViewerBridge, ViewerStatus,
};
