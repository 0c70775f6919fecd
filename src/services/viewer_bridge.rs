//! 阅读器桥接 - 业务能力层
//!
//! 管理一个外部渲染面的生命周期：绑定文档、捕获选区、翻页。
//! 渲染面每次只绑定一个文档，换文档就拆掉重建。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::clients::BackendApi;
use crate::config::{Config, SAMPLE_DOCUMENT_NAME};
use crate::error::ViewerError;
use crate::models::DocumentRef;

/// 指针释放等待失败后的重试间隔
const RELEASE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// 交给渲染引擎的文档来源
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// 文档字节
    Bytes(Arc<[u8]>),
    /// 远程地址（示例文档）
    Url(String),
}

/// 打开文档的请求
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub source: DocumentSource,
    pub display_name: String,
    pub client_id: String,
}

/// 外部渲染引擎
///
/// 引擎自身的脚本可能比调用方晚到，所以就绪分成两步：
/// 先 `is_loaded` 探测，未加载时等待一次性的 `ready_event`
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// 引擎脚本是否已经可用
    async fn is_loaded(&self) -> Result<bool, ViewerError>;

    /// 等待引擎的就绪事件（只触发一次）
    async fn ready_event(&self) -> Result<(), ViewerError>;

    /// 拆除当前渲染面
    async fn teardown(&self) -> Result<(), ViewerError>;

    /// 在渲染面中打开文档，返回导航句柄
    async fn open(&self, request: OpenRequest) -> Result<Box<dyn NavigationHandle>, ViewerError>;

    /// 等待下一次指针释放（整个视图范围内，而不只是渲染区域）
    async fn pointer_released(&self) -> Result<(), ViewerError>;
}

/// 渲染面的导航 / 选区句柄
#[async_trait]
pub trait NavigationHandle: Send + Sync {
    /// 当前选中的文本，没有选中时返回 `None` 或错误
    async fn selected_content(&self) -> Result<Option<String>, ViewerError>;

    /// 跳转到指定页
    async fn goto_location(&self, page: u32) -> Result<(), ViewerError>;
}

/// 阅读器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerStatus {
    /// 尚未加载任何文档
    Unbound,
    /// 导航句柄可用
    Ready,
    /// 引擎不可用，选区与导航都被禁用
    Disabled,
}

enum Binding {
    Unbound,
    Bound {
        document: String,
        handle: Box<dyn NavigationHandle>,
    },
    Disabled(String),
}

/// 阅读器桥接
pub struct ViewerBridge {
    engine: Arc<dyn RenderEngine>,
    backend: Arc<dyn BackendApi>,
    /// 引擎就绪闸门：未就绪 / 已就绪两态，并发的初始化请求在此排队
    readiness: OnceCell<()>,
    ready_timeout: Duration,
    fallback_url: String,
    binding: Binding,
    loads: usize,
}

impl ViewerBridge {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        backend: Arc<dyn BackendApi>,
        config: &Config,
    ) -> Self {
        Self {
            engine,
            backend,
            readiness: OnceCell::new(),
            ready_timeout: Duration::from_secs(config.viewer_ready_timeout_secs),
            fallback_url: config.viewer_fallback_url.clone(),
            binding: Binding::Unbound,
            loads: 0,
        }
    }

    /// 绑定文档并初始化渲染面
    ///
    /// 旧的渲染面与导航句柄先被拆除；失败只记录日志并禁用选区与导航
    pub async fn load(&mut self, document: Option<&DocumentRef>) -> ViewerStatus {
        self.binding = Binding::Unbound;
        self.loads += 1;
        if let Err(e) = self.engine.teardown().await {
            debug!("拆除旧渲染面失败（忽略）: {}", e);
        }

        let display_name = document
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| SAMPLE_DOCUMENT_NAME.to_string());

        match self.bind(document).await {
            Ok(handle) => {
                info!("📖 阅读器已加载: {}", display_name);
                self.binding = Binding::Bound {
                    document: display_name,
                    handle,
                };
                ViewerStatus::Ready
            }
            Err(e) => {
                error!("❌ 阅读器初始化失败，选区与翻页已禁用: {}", e);
                self.binding = Binding::Disabled(e.to_string());
                ViewerStatus::Disabled
            }
        }
    }

    async fn bind(
        &self,
        document: Option<&DocumentRef>,
    ) -> Result<Box<dyn NavigationHandle>, ViewerError> {
        self.wait_engine_ready().await?;

        let client_id = self
            .backend
            .fetch_embed_key()
            .await
            .map_err(ViewerError::Credential)?;

        let request = match document {
            Some(doc) if doc.has_content() => OpenRequest {
                source: DocumentSource::Bytes(doc.content_handle()),
                display_name: doc.name().to_string(),
                client_id,
            },
            Some(doc) => OpenRequest {
                source: DocumentSource::Url(self.fallback_url.clone()),
                display_name: doc.name().to_string(),
                client_id,
            },
            None => OpenRequest {
                source: DocumentSource::Url(self.fallback_url.clone()),
                display_name: SAMPLE_DOCUMENT_NAME.to_string(),
                client_id,
            },
        };

        self.engine.open(request).await
    }

    /// 通过就绪闸门：引擎已加载则立即通过，否则等待一次就绪事件
    async fn wait_engine_ready(&self) -> Result<(), ViewerError> {
        let engine = Arc::clone(&self.engine);
        let timeout = self.ready_timeout;
        self.readiness
            .get_or_try_init(|| async move {
                if engine.is_loaded().await? {
                    debug!("渲染引擎已就绪");
                    return Ok(());
                }
                info!("⏳ 渲染引擎脚本尚未加载，等待就绪事件...");
                tokio::time::timeout(timeout, engine.ready_event())
                    .await
                    .map_err(|_| ViewerError::ReadyTimeout(timeout.as_secs()))??;
                info!("✓ 渲染引擎就绪");
                Ok::<(), ViewerError>(())
            })
            .await?;
        Ok(())
    }

    /// 读取当前选区
    ///
    /// 没有选中文本、查询失败、阅读器未就绪都返回 `None`
    pub async fn capture_selection(&self) -> Option<String> {
        let Binding::Bound { handle, .. } = &self.binding else {
            return None;
        };

        match handle.selected_content().await {
            Ok(Some(text)) if !text.is_empty() => {
                debug!("捕获选区: {} 字符", text.chars().count());
                Some(text)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("选区查询失败（无选中内容时属正常）: {}", e);
                None
            }
        }
    }

    /// 等待下一次指针释放
    ///
    /// 只有阅读器被禁用时才返回错误；引擎的瞬时失败在短暂等待后重新等待
    pub async fn pointer_released(&self) -> Result<(), ViewerError> {
        loop {
            if let Binding::Disabled(reason) = &self.binding {
                return Err(ViewerError::EngineUnavailable(reason.clone()));
            }
            match self.engine.pointer_released().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("等待指针释放失败，重新等待: {}", e);
                    tokio::time::sleep(RELEASE_RETRY_DELAY).await;
                }
            }
        }
    }

    /// 等待指针释放后捕获选区
    pub async fn capture_on_release(&self) -> Result<Option<String>, ViewerError> {
        self.pointer_released().await?;
        Ok(self.capture_selection().await)
    }

    /// 跳转到指定页，导航句柄不存在时什么都不做
    ///
    /// 返回跳转请求是否已送达引擎
    pub async fn goto_page(&self, page: u32) -> bool {
        let Binding::Bound { handle, document } = &self.binding else {
            debug!("阅读器未就绪，忽略跳转到第 {} 页", page);
            return false;
        };

        match handle.goto_location(page).await {
            Ok(()) => {
                info!("📄 {} 跳转到第 {} 页", document, page);
                true
            }
            Err(e) => {
                warn!("跳转到第 {} 页失败: {}", page, e);
                false
            }
        }
    }

    pub fn status(&self) -> ViewerStatus {
        match self.binding {
            Binding::Unbound => ViewerStatus::Unbound,
            Binding::Bound { .. } => ViewerStatus::Ready,
            Binding::Disabled(_) => ViewerStatus::Disabled,
        }
    }

    /// 当前绑定的文档名
    pub fn bound_document(&self) -> Option<&str> {
        match &self.binding {
            Binding::Bound { document, .. } => Some(document),
            _ => None,
        }
    }

    /// 累计 `load` 次数
    pub fn load_count(&self) -> usize {
        self.loads
    }
}
