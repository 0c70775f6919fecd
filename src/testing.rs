//! 测试替身
//!
//! 内存实现的 `BackendApi` 与 `RenderEngine`，供单元测试和 `tests/` 下的集成测试共用。
//! 所有调用都会被记录，失败与挂起可以按端点单独控制。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::clients::BackendApi;
use crate::error::{ApiError, ViewerError};
use crate::models::{DocumentRef, Passage, SearchResponse};
use crate::services::viewer_bridge::{DocumentSource, NavigationHandle, OpenRequest, RenderEngine};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 后端端点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    EmbedKey,
    UploadBulk,
    UploadSingle,
    Search,
    Insights,
    Podcast,
}

impl Endpoint {
    fn path(self) -> &'static str {
        use crate::clients::backend_client::{
            EMBED_KEY_PATH, INSIGHTS_PATH, PODCAST_PATH, SEARCH_PATH, UPLOAD_BULK_PATH,
            UPLOAD_SINGLE_PATH,
        };
        match self {
            Endpoint::EmbedKey => EMBED_KEY_PATH,
            Endpoint::UploadBulk => UPLOAD_BULK_PATH,
            Endpoint::UploadSingle => UPLOAD_SINGLE_PATH,
            Endpoint::Search => SEARCH_PATH,
            Endpoint::Insights => INSIGHTS_PATH,
            Endpoint::Podcast => PODCAST_PATH,
        }
    }
}

/// 一次被记录的后端调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    EmbedKey,
    UploadBulk(Vec<String>),
    UploadSingle(String),
    Search { query: String, top_k: usize },
    Insights(usize),
    Podcast(usize),
}

impl Call {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Call::EmbedKey => Endpoint::EmbedKey,
            Call::UploadBulk(_) => Endpoint::UploadBulk,
            Call::UploadSingle(_) => Endpoint::UploadSingle,
            Call::Search { .. } => Endpoint::Search,
            Call::Insights(_) => Endpoint::Insights,
            Call::Podcast(_) => Endpoint::Podcast,
        }
    }
}

/// 内存后端
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Endpoint, Option<String>>>,
    gates: Mutex<HashMap<Endpoint, Arc<Notify>>>,
    embed_key: Mutex<String>,
    search_results: Mutex<Option<Vec<Passage>>>,
    insights: Mutex<Vec<String>>,
    podcast_url: Mutex<Option<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            embed_key: Mutex::new("test-client-id".to_string()),
            search_results: Mutex::new(Some(Vec::new())),
            insights: Mutex::new(Vec::new()),
            podcast_url: Mutex::new(None),
        }
    }

    /// 让端点以 500 拒绝，`detail` 为响应体中的 detail
    pub fn fail(&self, endpoint: Endpoint, detail: Option<&str>) {
        lock(&self.failures).insert(endpoint, detail.map(str::to_string));
    }

    /// 取消端点的失败设置
    pub fn succeed(&self, endpoint: Endpoint) {
        lock(&self.failures).remove(&endpoint);
    }

    /// 挂起端点：之后的每次调用都要等到返回的 `Notify` 放行一次
    pub fn hold(&self, endpoint: Endpoint) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.gates).insert(endpoint, Arc::clone(&gate));
        gate
    }

    /// `None` 模拟后端返回 `{"results": null}`
    pub fn set_search_results(&self, results: Option<Vec<Passage>>) {
        *lock(&self.search_results) = results;
    }

    pub fn set_insights(&self, insights: Vec<String>) {
        *lock(&self.insights) = insights;
    }

    pub fn set_podcast_url(&self, url: Option<&str>) {
        *lock(&self.podcast_url) = url.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// 记录调用，按需等待闸门，再检查失败设置
    async fn enter(&self, call: Call) -> Result<(), ApiError> {
        let endpoint = call.endpoint();
        lock(&self.calls).push(call);

        let gate = lock(&self.gates).get(&endpoint).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match lock(&self.failures).get(&endpoint) {
            Some(detail) => Err(ApiError::Rejected {
                endpoint: endpoint.path().to_string(),
                status: 500,
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn fetch_embed_key(&self) -> Result<String, ApiError> {
        self.enter(Call::EmbedKey).await?;
        Ok(lock(&self.embed_key).clone())
    }

    async fn upload_bulk(&self, files: &[DocumentRef]) -> Result<(), ApiError> {
        let names = files.iter().map(|f| f.name().to_string()).collect();
        self.enter(Call::UploadBulk(names)).await
    }

    async fn upload_single(&self, file: &DocumentRef) -> Result<(), ApiError> {
        self.enter(Call::UploadSingle(file.name().to_string())).await
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, ApiError> {
        self.enter(Call::Search {
            query: query.to_string(),
            top_k,
        })
        .await?;
        Ok(SearchResponse {
            results: lock(&self.search_results).clone(),
        })
    }

    async fn insights(&self, passages: &[Passage]) -> Result<Vec<String>, ApiError> {
        self.enter(Call::Insights(passages.len())).await?;
        Ok(lock(&self.insights).clone())
    }

    async fn podcast(&self, passages: &[Passage]) -> Result<Option<String>, ApiError> {
        self.enter(Call::Podcast(passages.len())).await?;
        Ok(lock(&self.podcast_url).clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineMode {
    Loaded,
    Pending,
    Unavailable,
}

#[derive(Default)]
struct EngineLog {
    opened: Vec<String>,
    opened_urls: Vec<String>,
    gotos: Vec<(String, u32)>,
    teardowns: usize,
}

struct EngineShared {
    mode: EngineMode,
    ready: Notify,
    pointer: Notify,
    ready_waits: AtomicUsize,
    pointer_waits: AtomicUsize,
    pointer_failure: Mutex<Option<String>>,
    selection: Mutex<Result<Option<String>, String>>,
    log: Mutex<EngineLog>,
}

/// 内存渲染引擎
pub struct FakeEngine {
    shared: Arc<EngineShared>,
}

impl FakeEngine {
    fn with_mode(mode: EngineMode) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                mode,
                ready: Notify::new(),
                pointer: Notify::new(),
                ready_waits: AtomicUsize::new(0),
                pointer_waits: AtomicUsize::new(0),
                pointer_failure: Mutex::new(None),
                selection: Mutex::new(Ok(None)),
                log: Mutex::new(EngineLog::default()),
            }),
        }
    }

    /// 引擎脚本已加载
    pub fn loaded() -> Self {
        Self::with_mode(EngineMode::Loaded)
    }

    /// 引擎脚本未加载，需等待 `fire_ready`
    pub fn pending() -> Self {
        Self::with_mode(EngineMode::Pending)
    }

    /// 引擎脚本永远不可用
    pub fn unavailable() -> Self {
        Self::with_mode(EngineMode::Unavailable)
    }

    /// 触发就绪事件（先于等待触发也有效）
    pub fn fire_ready(&self) {
        self.shared.ready.notify_one();
    }

    /// 模拟一次指针释放（先于等待触发也有效）
    pub fn release_pointer(&self) {
        self.shared.pointer.notify_one();
    }

    /// 下一次等待指针释放时返回一次瞬时错误
    pub fn fail_pointer_once(&self, message: &str) {
        *lock(&self.shared.pointer_failure) = Some(message.to_string());
    }

    /// 设置下一次选区查询的结果，`Err` 模拟引擎抛错
    pub fn set_selection(&self, selection: Result<Option<String>, String>) {
        *lock(&self.shared.selection) = selection;
    }

    /// 按顺序打开过的文档名
    pub fn opened(&self) -> Vec<String> {
        lock(&self.shared.log).opened.clone()
    }

    /// 以远程地址打开的文档
    pub fn opened_urls(&self) -> Vec<String> {
        lock(&self.shared.log).opened_urls.clone()
    }

    /// 送达的翻页请求 (文档名, 页码)
    pub fn gotos(&self) -> Vec<(String, u32)> {
        lock(&self.shared.log).gotos.clone()
    }

    pub fn teardowns(&self) -> usize {
        lock(&self.shared.log).teardowns
    }

    /// 等待就绪事件的次数
    pub fn ready_waits(&self) -> usize {
        self.shared.ready_waits.load(Ordering::SeqCst)
    }

    /// 等待指针释放的次数（含失败的那次）
    pub fn pointer_waits(&self) -> usize {
        self.shared.pointer_waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn is_loaded(&self) -> Result<bool, ViewerError> {
        Ok(self.shared.mode == EngineMode::Loaded)
    }

    async fn ready_event(&self) -> Result<(), ViewerError> {
        self.shared.ready_waits.fetch_add(1, Ordering::SeqCst);
        match self.shared.mode {
            EngineMode::Unavailable => Err(ViewerError::EngineUnavailable(
                "viewer script failed to load".to_string(),
            )),
            _ => {
                self.shared.ready.notified().await;
                Ok(())
            }
        }
    }

    async fn teardown(&self) -> Result<(), ViewerError> {
        lock(&self.shared.log).teardowns += 1;
        Ok(())
    }

    async fn open(&self, request: OpenRequest) -> Result<Box<dyn NavigationHandle>, ViewerError> {
        let mut log = lock(&self.shared.log);
        log.opened.push(request.display_name.clone());
        if let DocumentSource::Url(url) = &request.source {
            log.opened_urls.push(url.clone());
        }
        Ok(Box::new(FakeNavigation {
            document: request.display_name,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn pointer_released(&self) -> Result<(), ViewerError> {
        self.shared.pointer_waits.fetch_add(1, Ordering::SeqCst);
        let failure = lock(&self.shared.pointer_failure).take();
        if let Some(message) = failure {
            return Err(ViewerError::script(message));
        }
        self.shared.pointer.notified().await;
        Ok(())
    }
}

struct FakeNavigation {
    document: String,
    shared: Arc<EngineShared>,
}

#[async_trait]
impl NavigationHandle for FakeNavigation {
    async fn selected_content(&self) -> Result<Option<String>, ViewerError> {
        lock(&self.shared.selection)
            .clone()
            .map_err(ViewerError::Engine)
    }

    async fn goto_location(&self, page: u32) -> Result<(), ViewerError> {
        lock(&self.shared.log)
            .gotos
            .push((self.document.clone(), page));
        Ok(())
    }
}
