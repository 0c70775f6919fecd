//! # Doc Insight
//!
//! 文档洞察助手的客户端核心：知识库 → 焦点文档 → 查询 → 结果 四阶段流程
//!
//! ## 架构设计
//!
//! 本系统沿用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `AdobeEmbedEngine` - 基于页面脚本的渲染引擎实现
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - 与后端服务的全部 HTTP 交互（上传 / 搜索 / 要点 / 播客）
//!
//! ### ③ 业务能力层（Services）
//! - `ViewerBridge` - 渲染面的生命周期、选区捕获、翻页
//! - `ActiveDocumentSwitcher` - 点击段落时决定翻页还是切换文档
//!
//! ### ④ 流程层（Workflow）
//! - `WorkflowController` - 四阶段状态机，持有阶段间传递的全部数据
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/result_orchestrator` - 结果阶段并发请求两类派生内容
//! - `orchestrator/app` - 命令行会话驱动，持有浏览器资源
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{BackendApi, BackendClient};
pub use config::Config;
pub use error::{ApiError, AppError, AppResult, ViewerError, WorkflowError};
pub use infrastructure::{AdobeEmbedEngine, JsExecutor};
pub use models::{DerivedArtifacts, DocumentRef, KnowledgeSet, Passage, SessionPlan};
pub use orchestrator::{App, ResultOrchestrator};
pub use services::{ActiveDocumentSwitcher, ViewerBridge, ViewerStatus};
pub use workflow::{Stage, StageView, WorkflowController};
