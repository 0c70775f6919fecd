//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `result_orchestrator` - 结果面板编排
//! - 进入结果阶段时并发请求要点列表与音频摘要
//! - 两个请求各自维护加载标记，失败降级为"不展示"
//! - 代数计数丢弃离开结果阶段后才到达的完成结果
//!
//! ### `app` - 命令行会话驱动
//! - 管理应用生命周期（初始化、运行）
//! - 唯一持有 Browser 的模块
//! - 把阅读器选区和标准输入转换为流程操作
//!
//! ## 层次关系
//!
//! ```text
//! app (会话)
//!     ↓
//! workflow::WorkflowController (四阶段状态机) ── result_orchestrator
//!     ↓
//! services (ViewerBridge / ActiveDocumentSwitcher)
//!     ↓
//! infrastructure (JsExecutor / AdobeEmbedEngine)
//! ```

pub mod app;
pub mod result_orchestrator;

pub use app::App;
pub use result_orchestrator::ResultOrchestrator;
