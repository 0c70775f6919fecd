//! 命令行会话驱动 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：检查后端、启动或连接浏览器、创建 JsExecutor 与渲染引擎
//! 2. **资源管理**：持有 Browser，确保阅读器页面在会话期间存活
//! 3. **阶段驱动**：按会话计划上传文档，之后由阅读器选区和标准输入驱动流程
//!
//! 结果阶段的标准输入命令：段落编号跳转、`a` 查看要点与音频、`b` 返回、`r` 重置、`q` 退出

use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::Browser;
use futures::future::OptionFuture;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser;
use crate::clients::{BackendApi, BackendClient};
use crate::config::Config;
use crate::error::{AppResult, ViewerError};
use crate::infrastructure::{AdobeEmbedEngine, JsExecutor};
use crate::models::{load_documents, ArtifactsView, DocumentRef, SessionPlan};
use crate::orchestrator::ResultOrchestrator;
use crate::services::{ActiveDocumentSwitcher, SwitchOutcome, ViewerBridge, ViewerStatus};
use crate::utils::logging::{log_artifacts, log_passages, log_stage, log_startup, truncate_text};
use crate::workflow::{Stage, WorkflowController};

type Input = Lines<BufReader<Stdin>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

/// 结果阶段的一条标准输入命令
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Jump(usize),
    Artifacts,
    Back,
    Reset,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "a" => Command::Artifacts,
        "b" => Command::Back,
        "r" => Command::Reset,
        "q" => Command::Quit,
        other => other
            .parse::<usize>()
            .map(Command::Jump)
            .unwrap_or_else(|_| Command::Unknown(other.to_string())),
    }
}

enum AnalysisEvent {
    Captured(Result<Option<String>, ViewerError>),
    Line(Option<String>),
}

enum ResultsEvent {
    Artifacts(Result<Option<ArtifactsView>, tokio::task::JoinError>),
    Line(Option<String>),
}

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    viewer: ViewerBridge,
    controller: WorkflowController,
    switcher: ActiveDocumentSwitcher,
    plan_query_used: bool,
}

impl App {
    /// 初始化应用
    ///
    /// 日志需要在此之前由调用方初始化
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let backend = Arc::new(BackendClient::new(&config)?);
        match backend.health().await {
            Ok(()) => info!("✓ 后端在线: {}", backend.base_url()),
            Err(e) => warn!("⚠️ 后端健康检查失败（继续运行）: {}", e),
        }

        // 启动或连接浏览器
        let (browser, page) = browser::open_viewer_page(&config).await?;

        // 创建 JsExecutor（持有 page），再挂载渲染引擎
        let executor = JsExecutor::new(page);
        let engine = AdobeEmbedEngine::attach(executor, &config).await?;

        let api: Arc<dyn BackendApi> = backend;
        let viewer = ViewerBridge::new(Arc::new(engine), Arc::clone(&api), &config);
        let orchestrator = Arc::new(ResultOrchestrator::new(Arc::clone(&api)));
        let controller = WorkflowController::new(api, orchestrator, &config);
        let switcher = ActiveDocumentSwitcher::new(config.follow_up_navigation);

        Ok(Self {
            config,
            _browser: browser,
            viewer,
            controller,
            switcher,
            plan_query_used: false,
        })
    }

    /// 运行会话，直到用户退出或标准输入关闭
    pub async fn run(&mut self, plan: &SessionPlan) -> Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if self.controller.view().is_recovery() {
                warn!("⚠️ 缺少焦点文档，返回第一阶段");
                self.controller.reset();
            }

            let stage = self.controller.stage();
            log_stage(stage);
            let step = match stage {
                Stage::KnowledgeUpload => self.upload_knowledge(plan, &mut input).await?,
                Stage::PrimaryUpload => self.upload_focus(plan, &mut input).await?,
                Stage::Analysis => self.author_query(plan, &mut input).await?,
                Stage::Results => self.browse_results(&mut input).await?,
            };

            if step == Step::Quit {
                break;
            }
        }

        info!("👋 会话结束，日志已保存至: {}", self.config.output_log_file);
        Ok(())
    }

    async fn upload_knowledge(&mut self, plan: &SessionPlan, input: &mut Input) -> Result<Step> {
        let documents = load_documents(&plan.knowledge_files).await?;
        match self.controller.submit_knowledge_base(documents).await {
            Ok(_) => Ok(Step::Continue),
            Err(e) => {
                error!("❌ {}", e);
                retry_or_quit(input).await
            }
        }
    }

    async fn upload_focus(&mut self, plan: &SessionPlan, input: &mut Input) -> Result<Step> {
        let focus = DocumentRef::from_path(&plan.focus_file).await?;
        match self.controller.submit_primary_document(Some(focus)).await {
            Ok(_) => Ok(Step::Continue),
            Err(e) => {
                error!("❌ {}", e);
                retry_or_quit(input).await
            }
        }
    }

    /// 查询阶段：计划中的查询只自动提交一次，之后由选区或输入决定
    async fn author_query(&mut self, plan: &SessionPlan, input: &mut Input) -> Result<Step> {
        self.show_focus_document().await;

        if !self.plan_query_used {
            if let Some(query) = plan.query.as_deref() {
                self.plan_query_used = true;
                self.controller.set_query_text(query);
                self.search().await;
                return Ok(Step::Continue);
            }
        }

        info!("✍️ 在阅读器中选中文本作为查询，或直接输入查询文本");
        info!("   回车提交当前查询，b 返回，r 重置，q 退出");
        let mut selectable = self.viewer.status() == ViewerStatus::Ready;

        loop {
            let event = tokio::select! {
                captured = self.viewer.capture_on_release(), if selectable => {
                    AnalysisEvent::Captured(captured)
                }
                line = input.next_line() => AnalysisEvent::Line(line?),
            };

            match event {
                AnalysisEvent::Captured(Ok(selection)) => {
                    if self.controller.accept_selection(selection) {
                        info!(
                            "📝 查询文本: {}",
                            truncate_text(self.controller.state().query_text(), 80)
                        );
                    }
                }
                AnalysisEvent::Captured(Err(e)) => {
                    selectable = self.viewer.status() == ViewerStatus::Ready;
                    if !selectable {
                        warn!("⚠️ 选区捕获不可用: {}", e);
                    }
                }
                AnalysisEvent::Line(None) => return Ok(Step::Quit),
                AnalysisEvent::Line(Some(line)) => match line.trim() {
                    "" => {
                        self.search().await;
                        return Ok(Step::Continue);
                    }
                    "b" => {
                        self.controller.back();
                        return Ok(Step::Continue);
                    }
                    "r" => {
                        self.controller.reset();
                        return Ok(Step::Continue);
                    }
                    "q" => return Ok(Step::Quit),
                    text => {
                        self.controller.set_query_text(text);
                        self.search().await;
                        return Ok(Step::Continue);
                    }
                },
            }
        }
    }

    /// 以当前查询文本搜索，失败时留在查询阶段
    async fn search(&mut self) {
        let query = self.controller.state().query_text().to_string();
        if let Err(e) = self.controller.submit_query(&query).await {
            error!("❌ {}", e);
        }
    }

    /// 阅读器没有显示焦点文档时重新加载
    async fn show_focus_document(&mut self) {
        let Some(focus) = self.controller.state().focus() else {
            return;
        };
        if self.viewer.bound_document() != Some(focus.name()) {
            self.viewer.load(Some(focus)).await;
        }
    }

    async fn browse_results(&mut self, input: &mut Input) -> Result<Step> {
        let passages = self.controller.state().passages().to_vec();
        info!(
            "🔎 查询: {}",
            truncate_text(self.controller.state().query_text(), 80)
        );
        log_passages(&passages);

        self.show_focus_document().await;
        if let Some(focus) = self.controller.state().focus() {
            self.switcher.activate(focus);
        }

        let orchestrator = self.controller.artifacts();
        let mut artifacts: Option<JoinHandle<Option<ArtifactsView>>> = Some(tokio::spawn({
            let passages = passages.clone();
            async move { orchestrator.activate(passages).await }
        }));

        info!("输入段落编号跳转，a 查看要点与音频，b 返回，r 重置，q 退出");

        loop {
            let event = tokio::select! {
                Some(joined) = OptionFuture::from(artifacts.as_mut()), if artifacts.is_some() => {
                    ResultsEvent::Artifacts(joined)
                }
                line = input.next_line() => ResultsEvent::Line(line?),
            };

            match event {
                ResultsEvent::Artifacts(joined) => {
                    artifacts = None;
                    match joined {
                        Ok(Some(view)) => log_artifacts(&view),
                        Ok(None) => debug!("派生内容已过期，忽略"),
                        Err(e) => warn!("⚠️ 派生内容任务异常: {}", e),
                    }
                }
                ResultsEvent::Line(None) => return Ok(Step::Quit),
                ResultsEvent::Line(Some(line)) => match parse_command(&line) {
                    Command::Jump(number) => {
                        let Some(passage) = number.checked_sub(1).and_then(|i| passages.get(i))
                        else {
                            warn!("没有第 {} 个段落", number);
                            continue;
                        };
                        let outcome = self
                            .switcher
                            .on_passage_click(
                                passage,
                                self.controller.known_documents(),
                                &mut self.viewer,
                            )
                            .await;
                        log_switch_outcome(&outcome);
                    }
                    Command::Artifacts => log_artifacts(&self.controller.artifacts().view()),
                    Command::Back => {
                        self.controller.back();
                        self.switcher.clear();
                        return Ok(Step::Continue);
                    }
                    Command::Reset => {
                        self.controller.reset();
                        self.switcher.clear();
                        return Ok(Step::Continue);
                    }
                    Command::Quit => return Ok(Step::Quit),
                    Command::Unknown(other) => warn!("未知命令: {}", other),
                },
            }
        }
    }
}

async fn retry_or_quit(input: &mut Input) -> Result<Step> {
    info!("按回车重试，输入 q 退出");
    match input.next_line().await? {
        Some(line) if line.trim() != "q" => Ok(Step::Continue),
        _ => Ok(Step::Quit),
    }
}

fn log_switch_outcome(outcome: &SwitchOutcome) {
    match outcome {
        SwitchOutcome::Navigated {
            delivered: false, ..
        } => warn!("⚠️ 阅读器不可用，无法翻页"),
        SwitchOutcome::Navigated { .. } => {}
        SwitchOutcome::Switched {
            status: ViewerStatus::Ready,
            ..
        } => {}
        SwitchOutcome::Switched { document, .. } => {
            warn!("⚠️ 已切换到 {}，但阅读器不可用", document)
        }
        SwitchOutcome::Unresolved { source } => warn!("⚠️ 未知的来源文档: {}", source),
    }
}
