use thiserror::Error;

use crate::workflow::Stage;

/// 装箱的底层错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
///
/// 应用初始化阶段的统一错误：配置、浏览器、渲染引擎
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 浏览器协议错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
    /// 浏览器启动参数无效
    #[error("浏览器启动配置无效: {0}")]
    Launch(String),
    /// 渲染面相关错误
    #[error("阅读器错误: {0}")]
    Viewer(#[from] ViewerError),
}

/// 后端 API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败（连接失败、超时等）
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    /// API 返回非成功状态
    #[error("API返回错误响应 ({endpoint}): status={status}, detail={detail:?}")]
    Rejected {
        endpoint: String,
        status: u16,
        detail: Option<String>,
    },
    /// 响应体不符合约定的结构
    #[error("API响应格式错误 ({endpoint}): {message}")]
    MalformedPayload { endpoint: String, message: String },
}

impl ApiError {
    /// 面向用户的错误提示
    ///
    /// 优先使用后端返回的 `detail`，否则使用调用方给出的兜底文案
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            ApiError::RequestFailed { endpoint, .. }
            | ApiError::Rejected { endpoint, .. }
            | ApiError::MalformedPayload { endpoint, .. } => endpoint,
        }
    }
}

/// 渲染面相关错误
#[derive(Debug, Error)]
pub enum ViewerError {
    /// 渲染引擎完全不可用
    #[error("渲染引擎不可用: {0}")]
    EngineUnavailable(String),
    /// 等待就绪事件超时
    #[error("等待渲染引擎就绪超时 ({0} 秒)")]
    ReadyTimeout(u64),
    /// 获取嵌入凭证失败，初始化中止
    #[error("获取嵌入凭证失败: {0}")]
    Credential(#[source] ApiError),
    /// 页面脚本执行失败
    #[error("执行脚本失败: {source}")]
    Script {
        #[source]
        source: BoxError,
    },
    /// 引擎自身报告的失败（例如没有选中文本）
    #[error("渲染引擎返回错误: {0}")]
    Engine(String),
}

impl ViewerError {
    pub fn script(source: impl Into<BoxError>) -> Self {
        ViewerError::Script {
            source: source.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for ViewerError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ViewerError::script(err)
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::script(err)
    }
}

/// 流程状态机错误
///
/// 所有错误都不推进阶段，用户可以重新提交
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// 知识库批次为空
    #[error("知识库文件列表不能为空")]
    EmptyKnowledgeBatch,
    /// 未选择焦点文档
    #[error("必须选择一个焦点文档")]
    MissingFocusDocument,
    /// 查询文本为空
    #[error("查询文本不能为空")]
    EmptyQuery,
    /// 在错误的阶段调用
    #[error("当前阶段 {actual} 不允许该操作 (需要: {expected})")]
    WrongStage { expected: Stage, actual: Stage },
    /// 已有同类请求在进行中
    #[error("已有请求正在进行中，请稍候")]
    Busy,
    /// 远程调用失败，`message` 为展示给用户的文案
    #[error("{message}")]
    Remote {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl WorkflowError {
    pub fn remote(source: ApiError, fallback: &str) -> Self {
        WorkflowError::Remote {
            message: source.user_message(fallback),
            source,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// URL 格式不正确
    #[error("无效的 URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },
    /// HTTP 客户端构建失败
    #[error("HTTP 客户端初始化失败: {0}")]
    HttpClient(String),
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
