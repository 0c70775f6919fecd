//! 当前文档切换 - 业务能力层
//!
//! 点击一个段落时决定：在当前文档上翻页，还是把阅读器切换到另一份已知文档

use tracing::{debug, info, warn};

use crate::models::{DocumentRef, KnownDocuments, Passage};
use crate::services::viewer_bridge::{ViewerBridge, ViewerStatus};

/// 对一次段落点击的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDecision<'a> {
    /// 目标就是当前文档，直接翻页
    Navigate { page: u32 },
    /// 切换到另一份已知文档
    Switch { target: &'a DocumentRef, page: u32 },
    /// 来源文档不在已知集合中
    Unresolved,
}

/// 点击处理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// 在当前文档上翻页
    Navigated { page: u32, delivered: bool },
    /// 已切换文档；`follow_up` 为补发翻页的结果（未启用补发时为 `None`）
    Switched {
        document: String,
        status: ViewerStatus,
        follow_up: Option<bool>,
    },
    /// 来源文档未知，什么都没做
    Unresolved { source: String },
}

/// 当前文档切换器
///
/// 持有结果阶段的当前文档（ActiveDocument），它始终是已知文档之一
pub struct ActiveDocumentSwitcher {
    active: Option<DocumentRef>,
    follow_up_navigation: bool,
}

impl ActiveDocumentSwitcher {
    /// `follow_up_navigation` 为 true 时，切换文档并重新加载成功后补发原目标页的跳转
    pub fn new(follow_up_navigation: bool) -> Self {
        Self {
            active: None,
            follow_up_navigation,
        }
    }

    /// 进入结果阶段时以焦点文档初始化
    pub fn activate(&mut self, focus: &DocumentRef) {
        debug!("当前文档初始化为焦点文档 {}", focus.name());
        self.active = Some(focus.clone());
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&DocumentRef> {
        self.active.as_ref()
    }

    /// 只做判断，不产生副作用
    pub fn decide<'a>(&self, passage: &Passage, known: KnownDocuments<'a>) -> SwitchDecision<'a> {
        let source = passage.source_document_name();
        let page = passage.page();

        if self.active.as_ref().is_some_and(|active| active.matches(source)) {
            return SwitchDecision::Navigate { page };
        }

        match known.resolve(source) {
            Some(target) => SwitchDecision::Switch { target, page },
            None => SwitchDecision::Unresolved,
        }
    }

    /// 处理一次段落点击
    pub async fn on_passage_click(
        &mut self,
        passage: &Passage,
        known: KnownDocuments<'_>,
        viewer: &mut ViewerBridge,
    ) -> SwitchOutcome {
        match self.decide(passage, known) {
            SwitchDecision::Navigate { page } => {
                let delivered = viewer.goto_page(page).await;
                SwitchOutcome::Navigated { page, delivered }
            }
            SwitchDecision::Switch { target, page } => {
                info!(
                    "🔀 切换当前文档: {} → {}",
                    self.active.as_ref().map(DocumentRef::name).unwrap_or("-"),
                    target.name()
                );
                self.active = Some(target.clone());
                let status = viewer.load(Some(target)).await;

                let follow_up = if self.follow_up_navigation && status == ViewerStatus::Ready {
                    Some(viewer.goto_page(page).await)
                } else {
                    None
                };

                SwitchOutcome::Switched {
                    document: target.name().to_string(),
                    status,
                    follow_up,
                }
            }
            SwitchDecision::Unresolved => {
                warn!(
                    "段落来源 {} 不在已知文档中，忽略点击",
                    passage.source_document_name()
                );
                SwitchOutcome::Unresolved {
                    source: passage.source_document_name().to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::KnowledgeSet;
    use crate::testing::{FakeBackend, FakeEngine};
    use std::sync::Arc;

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::new(name, b"%PDF".to_vec())
    }

    struct Fixture {
        engine: Arc<FakeEngine>,
        viewer: ViewerBridge,
        focus: DocumentRef,
        knowledge: KnowledgeSet,
    }

    impl Fixture {
        async fn click(
            &mut self,
            switcher: &mut ActiveDocumentSwitcher,
            passage: &Passage,
        ) -> SwitchOutcome {
            let known = KnownDocuments::new(Some(&self.focus), &self.knowledge);
            switcher.on_passage_click(passage, known, &mut self.viewer).await
        }
    }

    async fn fixture() -> Fixture {
        let engine = Arc::new(FakeEngine::loaded());
        let backend = Arc::new(FakeBackend::new());
        let mut viewer = ViewerBridge::new(engine.clone(), backend, &Config::default());
        let focus = doc("a.pdf");
        viewer.load(Some(&focus)).await;
        Fixture {
            engine,
            viewer,
            focus,
            knowledge: KnowledgeSet::new().merged_with(vec![doc("b.pdf"), doc("c.pdf")]),
        }
    }

    #[tokio::test]
    async fn same_document_navigates_without_reload() {
        let mut f = fixture().await;
        let mut switcher = ActiveDocumentSwitcher::new(true);
        switcher.activate(&f.focus);
        let passage = Passage::new("H1", "docs/a.pdf", 3, "...").unwrap();

        let outcome = f.click(&mut switcher, &passage).await;

        assert_eq!(
            outcome,
            SwitchOutcome::Navigated {
                page: 3,
                delivered: true
            }
        );
        assert_eq!(f.engine.gotos(), vec![("a.pdf".to_string(), 3)]);
        assert_eq!(f.engine.opened().len(), 1);
        assert_eq!(f.viewer.load_count(), 1);
    }

    #[tokio::test]
    async fn other_known_document_is_activated() {
        let mut f = fixture().await;
        let mut switcher = ActiveDocumentSwitcher::new(false);
        switcher.activate(&f.focus);
        let passage = Passage::new("H2", "store/pdfs/b.pdf", 5, "...").unwrap();

        let outcome = f.click(&mut switcher, &passage).await;

        assert_eq!(
            outcome,
            SwitchOutcome::Switched {
                document: "b.pdf".to_string(),
                status: ViewerStatus::Ready,
                follow_up: None,
            }
        );
        assert_eq!(switcher.active().map(DocumentRef::name), Some("b.pdf"));
        assert_eq!(f.viewer.bound_document(), Some("b.pdf"));
        // 未启用补发时不翻页
        assert!(f.engine.gotos().is_empty());
    }

    #[tokio::test]
    async fn follow_up_navigation_after_switch() {
        let mut f = fixture().await;
        let mut switcher = ActiveDocumentSwitcher::new(true);
        switcher.activate(&f.focus);
        let passage = Passage::new("H3", "c.pdf", 9, "...").unwrap();

        let outcome = f.click(&mut switcher, &passage).await;

        assert!(matches!(outcome, SwitchOutcome::Switched { follow_up: Some(true), .. }));
        assert_eq!(f.engine.gotos(), vec![("c.pdf".to_string(), 9)]);
    }

    #[tokio::test]
    async fn unknown_document_changes_nothing() {
        let mut f = fixture().await;
        let mut switcher = ActiveDocumentSwitcher::new(true);
        switcher.activate(&f.focus);
        let passage = Passage::new("H4", "elsewhere/zzz.pdf", 2, "...").unwrap();

        let outcome = f.click(&mut switcher, &passage).await;

        assert_eq!(
            outcome,
            SwitchOutcome::Unresolved {
                source: "zzz.pdf".to_string()
            }
        );
        assert_eq!(switcher.active().map(DocumentRef::name), Some("a.pdf"));
        assert_eq!(f.viewer.bound_document(), Some("a.pdf"));
        assert_eq!(f.viewer.load_count(), 1);
        assert!(f.engine.gotos().is_empty());
    }

    #[tokio::test]
    async fn matching_is_case_sensitive() {
        let f = fixture().await;
        let mut switcher = ActiveDocumentSwitcher::new(true);
        switcher.activate(&f.focus);
        let passage = Passage::new("H", "A.PDF", 1, "").unwrap();

        assert_eq!(
            switcher.decide(&passage, KnownDocuments::new(Some(&f.focus), &f.knowledge)),
            SwitchDecision::Unresolved
        );
    }
}
