//! 四阶段流程控制器 - 流程层
//!
//! 核心职责：
//! 1. 校验每个阶段的前置条件
//! 2. 调用后端，只在成功后提交状态并推进阶段
//! 3. 失败时保持阶段不变，错误文案交给调用方展示

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clients::BackendApi;
use crate::config::Config;
use crate::error::WorkflowError;
use crate::models::{DocumentRef, KnownDocuments, Passage};
use crate::orchestrator::ResultOrchestrator;
use crate::services::ViewerBridge;
use crate::utils::logging::truncate_text;
use crate::workflow::request_token::InFlight;
use crate::workflow::stage::{Stage, StageView};
use crate::workflow::state::WorkflowState;

/// 知识库上传失败且没有 detail 时的提示
pub const UPLOAD_FAILED: &str = "Failed to upload files.";
/// 焦点文档上传失败且没有 detail 时的提示
pub const PROCESS_FAILED: &str = "Failed to process document.";
/// 搜索失败且没有 detail 时的提示
pub const SEARCH_FAILED: &str = "Search request failed.";

/// 流程控制器
///
/// - 唯一持有 `WorkflowState`
/// - 提交类操作由 `InFlight` 令牌防止重入
/// - 离开结果阶段时使派生内容失效
pub struct WorkflowController {
    backend: Arc<dyn BackendApi>,
    artifacts: Arc<ResultOrchestrator>,
    state: WorkflowState,
    in_flight: InFlight,
    top_k: usize,
}

impl WorkflowController {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        artifacts: Arc<ResultOrchestrator>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            artifacts,
            state: WorkflowState::default(),
            in_flight: InFlight::new(),
            top_k: config.search_top_k,
        }
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn known_documents(&self) -> KnownDocuments<'_> {
        self.state.known_documents()
    }

    /// 共享的在途标记，可用于展示忙碌状态
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub fn artifacts(&self) -> Arc<ResultOrchestrator> {
        Arc::clone(&self.artifacts)
    }

    fn expect_stage(&self, expected: Stage) -> Result<(), WorkflowError> {
        if self.state.stage == expected {
            Ok(())
        } else {
            Err(WorkflowError::WrongStage {
                expected,
                actual: self.state.stage,
            })
        }
    }

    /// 提交知识库批次
    ///
    /// 与已接受的集合按名字合并去重后整体上传；上传成功才提交合并结果并进入焦点文档阶段
    pub async fn submit_knowledge_base(
        &mut self,
        files: Vec<DocumentRef>,
    ) -> Result<Stage, WorkflowError> {
        self.expect_stage(Stage::KnowledgeUpload)?;
        if files.is_empty() {
            return Err(WorkflowError::EmptyKnowledgeBatch);
        }
        let _token = self.in_flight.try_acquire()?;

        let incoming = files.len();
        let merged = self.state.knowledge_set.merged_with(files);
        info!(
            "📚 上传知识库: 本次 {} 个, 合并后 {} 个 {:?}",
            incoming,
            merged.len(),
            merged.names()
        );

        if let Err(e) = self.backend.upload_bulk(merged.documents()).await {
            error!("❌ 知识库上传失败: {}", e);
            return Err(WorkflowError::remote(e, UPLOAD_FAILED));
        }

        self.state.knowledge_set = merged;
        self.state.stage = Stage::PrimaryUpload;
        info!("✓ 知识库已接受，进入{}阶段", self.state.stage);
        Ok(self.state.stage)
    }

    /// 提交焦点文档
    pub async fn submit_primary_document(
        &mut self,
        file: Option<DocumentRef>,
    ) -> Result<Stage, WorkflowError> {
        self.expect_stage(Stage::PrimaryUpload)?;
        let file = file.ok_or(WorkflowError::MissingFocusDocument)?;
        let _token = self.in_flight.try_acquire()?;

        info!("📄 上传焦点文档: {}", file.name());
        if let Err(e) = self.backend.upload_single(&file).await {
            error!("❌ 焦点文档上传失败: {}", e);
            return Err(WorkflowError::remote(e, PROCESS_FAILED));
        }

        let changed = self.state.focus.as_ref() != Some(&file);
        if changed {
            // 上一轮的查询结果属于旧的焦点文档
            self.state.passages.clear();
            self.state.searched = false;
        }
        self.state.focus = Some(file);
        self.state.stage = Stage::Analysis;
        info!("✓ 焦点文档已接受，进入{}阶段", self.state.stage);
        Ok(self.state.stage)
    }

    /// 提交查询：搜索成功后进入结果阶段
    pub async fn submit_query(&mut self, text: &str) -> Result<Stage, WorkflowError> {
        self.check_query(text)?;
        let _token = self.in_flight.try_acquire()?;

        info!(
            "🔍 搜索: \"{}\" (top_k={})",
            truncate_text(text.trim(), 60),
            self.top_k
        );

        // 空白只用于判空，请求携带原始文本
        let response = match self.backend.search(text, self.top_k).await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ 搜索失败: {}", e);
                return Err(WorkflowError::remote(e, SEARCH_FAILED));
            }
        };

        self.complete_query(text, response.results)
    }

    /// 以已经得到的搜索结果完成查询
    ///
    /// `None` 视为空列表；查询文本原样保存为本次搜索的记录
    pub fn complete_query(
        &mut self,
        text: &str,
        results: Option<Vec<Passage>>,
    ) -> Result<Stage, WorkflowError> {
        self.check_query(text)?;

        let passages = results.unwrap_or_default();
        if passages.is_empty() {
            warn!("⚠️ 搜索没有返回任何段落");
        } else {
            info!("✓ 搜索返回 {} 个段落", passages.len());
        }

        self.artifacts.invalidate();
        self.state.query_text = text.to_string();
        self.state.passages = passages;
        self.state.searched = true;
        self.state.stage = Stage::Results;
        Ok(self.state.stage)
    }

    fn check_query(&self, text: &str) -> Result<(), WorkflowError> {
        self.expect_stage(Stage::Analysis)?;
        if self.state.focus.is_none() {
            return Err(WorkflowError::MissingFocusDocument);
        }
        if text.trim().is_empty() {
            return Err(WorkflowError::EmptyQuery);
        }
        Ok(())
    }

    /// 返回上一屏，保留已携带的数据
    pub fn back(&mut self) -> Stage {
        if let Some(previous) = self.state.stage.previous() {
            if self.state.stage == Stage::Results {
                self.artifacts.invalidate();
            }
            debug!("返回: {} → {}", self.state.stage, previous);
            self.state.stage = previous;
        }
        self.state.stage
    }

    /// 直接进入某个阶段（对应按地址直接打开某一屏）
    ///
    /// 前置条件不满足时不报错，`view()` 会给出恢复视图
    pub fn navigate_to(&mut self, stage: Stage) -> StageView<'_> {
        if self.state.stage == Stage::Results && stage != Stage::Results {
            self.artifacts.invalidate();
        }
        self.state.stage = stage;
        self.view()
    }

    /// 清空全部数据并回到第一阶段，可以在任何阶段调用
    pub fn reset(&mut self) {
        if !self.state.is_pristine() {
            info!("🔄 重置流程");
        }
        self.artifacts.invalidate();
        self.state = WorkflowState::default();
    }

    /// 当前阶段的视图
    pub fn view(&self) -> StageView<'_> {
        let state = &self.state;
        match (state.stage, state.focus.as_ref()) {
            (requested, None) if requested.requires_focus() => StageView::NoDocument { requested },
            (Stage::KnowledgeUpload, _) => StageView::KnowledgeUpload {
                accepted: &state.knowledge_set,
            },
            (Stage::PrimaryUpload, _) => StageView::PrimaryUpload {
                knowledge: &state.knowledge_set,
            },
            (Stage::Analysis, Some(focus)) => StageView::Analysis {
                focus,
                query_text: &state.query_text,
                can_submit: !state.query_text.trim().is_empty() && !self.in_flight.is_busy(),
            },
            (Stage::Results, Some(focus)) if state.searched => StageView::Results {
                focus,
                query_text: &state.query_text,
                passages: &state.passages,
            },
            // 没有经过成功的查询就进入结果阶段
            (requested, _) => StageView::NoDocument { requested },
        }
    }

    /// 直接编辑查询文本
    pub fn set_query_text(&mut self, text: impl Into<String>) {
        self.state.query_text = text.into();
    }

    /// 以捕获到的选区覆盖查询文本
    ///
    /// 只在查询阶段生效；空选区被忽略
    pub fn accept_selection(&mut self, selection: Option<String>) -> bool {
        if self.state.stage != Stage::Analysis {
            return false;
        }
        match selection {
            Some(text) if !text.is_empty() => {
                debug!("选区覆盖查询文本: {}", truncate_text(&text, 40));
                self.state.query_text = text;
                true
            }
            _ => false,
        }
    }

    /// 从阅读器读取当前选区并覆盖查询文本
    pub async fn capture_selection(&mut self, viewer: &ViewerBridge) -> bool {
        if self.state.stage != Stage::Analysis {
            return false;
        }
        let selection = viewer.capture_selection().await;
        self.accept_selection(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Endpoint, FakeBackend, FakeEngine};

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::new(name, name.as_bytes().to_vec())
    }

    fn passage(source: &str, page: i64) -> Passage {
        Passage::new("Heading", source, page, "content").unwrap()
    }

    fn controller(backend: &Arc<FakeBackend>) -> WorkflowController {
        let orchestrator = Arc::new(ResultOrchestrator::new(backend.clone()));
        WorkflowController::new(backend.clone(), orchestrator, &Config::default())
    }

    async fn at_analysis(backend: &Arc<FakeBackend>) -> WorkflowController {
        let mut c = controller(backend);
        c.submit_knowledge_base(vec![doc("k.pdf")]).await.unwrap();
        c.submit_primary_document(Some(doc("a.pdf"))).await.unwrap();
        c
    }

    #[tokio::test]
    async fn knowledge_set_stays_unique_across_submissions() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        c.submit_knowledge_base(vec![doc("a.pdf")]).await.unwrap();
        assert_eq!(c.back(), Stage::KnowledgeUpload);
        let stage = c
            .submit_knowledge_base(vec![doc("a.pdf"), doc("b.pdf")])
            .await
            .unwrap();

        assert_eq!(stage, Stage::PrimaryUpload);
        assert_eq!(c.state().knowledge_set().names(), vec!["a.pdf", "b.pdf"]);
        assert_eq!(
            backend.calls(),
            vec![
                Call::UploadBulk(vec!["a.pdf".into()]),
                Call::UploadBulk(vec!["a.pdf".into(), "b.pdf".into()]),
            ]
        );
    }

    #[tokio::test]
    async fn duplicates_within_one_batch_are_dropped() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        c.submit_knowledge_base(vec![doc("a.pdf"), doc("dir/a.pdf"), doc("b.pdf")])
            .await
            .unwrap();
        assert_eq!(c.state().knowledge_set().names(), vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_without_upload() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        let err = c.submit_knowledge_base(Vec::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyKnowledgeBatch));
        assert_eq!(c.stage(), Stage::KnowledgeUpload);
        assert_eq!(backend.count(Endpoint::UploadBulk), 0);
    }

    #[tokio::test]
    async fn rejected_upload_keeps_stage_and_surfaces_detail() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Endpoint::UploadBulk, Some("Only PDF files are accepted"));
        let mut c = controller(&backend);

        let err = c.submit_knowledge_base(vec![doc("a.pdf")]).await.unwrap_err();
        assert_eq!(err.to_string(), "Only PDF files are accepted");
        assert_eq!(c.stage(), Stage::KnowledgeUpload);
        assert!(c.state().knowledge_set().is_empty());
        assert!(!c.is_busy());

        // 用户可以重试
        backend.succeed(Endpoint::UploadBulk);
        assert_eq!(
            c.submit_knowledge_base(vec![doc("a.pdf")]).await.unwrap(),
            Stage::PrimaryUpload
        );
    }

    #[tokio::test]
    async fn upload_failure_without_detail_uses_fallback() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);
        c.submit_knowledge_base(vec![doc("k.pdf")]).await.unwrap();

        backend.fail(Endpoint::UploadSingle, None);
        let err = c
            .submit_primary_document(Some(doc("a.pdf")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), PROCESS_FAILED);
        assert_eq!(c.stage(), Stage::PrimaryUpload);
        assert!(c.state().focus().is_none());
    }

    #[tokio::test]
    async fn missing_focus_document_is_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);
        c.submit_knowledge_base(vec![doc("k.pdf")]).await.unwrap();

        let err = c.submit_primary_document(None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingFocusDocument));
        assert_eq!(backend.count(Endpoint::UploadSingle), 0);
    }

    #[tokio::test]
    async fn wrong_stage_is_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        let err = c.submit_query("anything").await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::WrongStage {
                expected: Stage::Analysis,
                actual: Stage::KnowledgeUpload
            }
        ));
    }

    #[tokio::test]
    async fn null_results_become_empty_list() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;

        let stage = c.complete_query("climate", None).unwrap();
        assert_eq!(stage, Stage::Results);
        assert!(c.state().passages().is_empty());
        assert!(matches!(c.view(), StageView::Results { passages: [], .. }));
    }

    #[tokio::test]
    async fn null_results_from_backend_become_empty_list() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_search_results(None);
        let mut c = at_analysis(&backend).await;

        assert_eq!(c.submit_query("climate").await.unwrap(), Stage::Results);
        assert!(c.state().passages().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;

        let err = c.submit_query("   \n").await.unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyQuery));
        assert_eq!(c.stage(), Stage::Analysis);
        assert_eq!(backend.count(Endpoint::Search), 0);
    }

    #[tokio::test]
    async fn search_preserves_order_and_records_query() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_search_results(Some(vec![
            passage("docs/a.pdf", 3),
            passage("k.pdf", 1),
            passage("a.pdf", 7),
        ]));
        let mut c = at_analysis(&backend).await;

        c.submit_query("  renewable targets ").await.unwrap();

        let pages: Vec<u32> = c.state().passages().iter().map(Passage::page).collect();
        assert_eq!(pages, vec![3, 1, 7]);
        assert_eq!(c.state().query_text(), "  renewable targets ");
        assert!(backend.calls().contains(&Call::Search {
            query: "  renewable targets ".into(),
            top_k: 3
        }));
    }

    #[tokio::test]
    async fn search_failure_keeps_analysis_stage() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Endpoint::Search, None);
        let mut c = at_analysis(&backend).await;

        let err = c.submit_query("climate").await.unwrap_err();
        assert_eq!(err.to_string(), SEARCH_FAILED);
        assert_eq!(c.stage(), Stage::Analysis);
    }

    #[tokio::test]
    async fn concurrent_submission_is_busy() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        let token = c.in_flight().try_acquire().unwrap();
        let err = c.submit_knowledge_base(vec![doc("a.pdf")]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Busy));
        assert_eq!(backend.count(Endpoint::UploadBulk), 0);

        drop(token);
        assert!(c.submit_knowledge_base(vec![doc("a.pdf")]).await.is_ok());
    }

    #[tokio::test]
    async fn back_is_non_destructive() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;
        c.complete_query("q", Some(vec![passage("a.pdf", 2)])).unwrap();

        assert_eq!(c.back(), Stage::Analysis);
        assert_eq!(c.state().query_text(), "q");
        assert_eq!(c.state().passages().len(), 1);

        assert_eq!(c.back(), Stage::PrimaryUpload);
        assert_eq!(c.state().focus().map(DocumentRef::name), Some("a.pdf"));

        assert_eq!(c.back(), Stage::KnowledgeUpload);
        assert_eq!(c.state().knowledge_set().len(), 1);
        assert_eq!(c.back(), Stage::KnowledgeUpload);
    }

    #[tokio::test]
    async fn entering_later_stage_without_focus_shows_recovery() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = controller(&backend);

        assert_eq!(
            c.navigate_to(Stage::Analysis),
            StageView::NoDocument {
                requested: Stage::Analysis
            }
        );
        assert!(c.navigate_to(Stage::Results).is_recovery());

        c.reset();
        assert!(matches!(c.view(), StageView::KnowledgeUpload { .. }));
    }

    #[tokio::test]
    async fn entering_results_without_search_shows_recovery() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;

        assert_eq!(
            c.navigate_to(Stage::Results),
            StageView::NoDocument {
                requested: Stage::Results
            }
        );

        c.navigate_to(Stage::Analysis);
        c.complete_query("q", Some(vec![passage("a.pdf", 2)])).unwrap();
        assert_eq!(c.back(), Stage::Analysis);
        assert!(matches!(
            c.navigate_to(Stage::Results),
            StageView::Results { passages: [_], .. }
        ));

        // 换了焦点文档，旧的查询不再算数
        c.back();
        c.back();
        c.submit_primary_document(Some(doc("b.pdf"))).await.unwrap();
        assert!(!c.state().has_searched());
        assert!(c.navigate_to(Stage::Results).is_recovery());
    }

    #[tokio::test]
    async fn reset_twice_equals_once() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;
        c.complete_query("q", Some(vec![passage("a.pdf", 2)])).unwrap();

        c.reset();
        let once = c.state().clone();
        c.reset();

        assert!(c.state().is_pristine());
        assert!(!c.state().has_searched());
        assert_eq!(c.stage(), once.stage());
        assert_eq!(c.state().knowledge_set(), once.knowledge_set());
        assert_eq!(c.state().passages(), once.passages());
        assert_eq!(c.state().query_text(), once.query_text());
    }

    #[tokio::test]
    async fn selection_overwrites_query_only_in_analysis() {
        let backend = Arc::new(FakeBackend::new());
        let engine = Arc::new(FakeEngine::loaded());
        let mut viewer = ViewerBridge::new(engine.clone(), backend.clone(), &Config::default());
        let mut c = at_analysis(&backend).await;
        viewer.load(c.state().focus()).await;

        c.set_query_text("typed by hand");
        engine.set_selection(Ok(Some("selected words".into())));
        assert!(c.capture_selection(&viewer).await);
        assert_eq!(c.state().query_text(), "selected words");

        engine.set_selection(Ok(Some(String::new())));
        assert!(!c.capture_selection(&viewer).await);
        engine.set_selection(Err("nothing selected".into()));
        assert!(!c.capture_selection(&viewer).await);
        assert_eq!(c.state().query_text(), "selected words");

        c.complete_query("selected words", None).unwrap();
        engine.set_selection(Ok(Some("later".into())));
        assert!(!c.capture_selection(&viewer).await);
        assert_eq!(c.state().query_text(), "selected words");
    }

    #[tokio::test]
    async fn analysis_view_reports_submittable_query() {
        let backend = Arc::new(FakeBackend::new());
        let mut c = at_analysis(&backend).await;

        assert!(matches!(c.view(), StageView::Analysis { can_submit: false, .. }));
        c.set_query_text("q");
        assert!(matches!(c.view(), StageView::Analysis { can_submit: true, .. }));
    }
}
