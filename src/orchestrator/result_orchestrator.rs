//! 结果编排 - 编排层
//!
//! 进入结果阶段后，对同一组段落并发请求要点列表和音频摘要。
//! 两个请求各自维护加载标记，互不等待，也不阻塞阶段切换。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::clients::BackendApi;
use crate::models::{ArtifactsView, Passage};

struct Slot {
    /// 每次进入 / 离开结果阶段都递增，晚到的完成结果据此丢弃
    generation: u64,
    view: ArtifactsView,
}

/// 结果面板编排器
pub struct ResultOrchestrator {
    backend: Arc<dyn BackendApi>,
    slot: Mutex<Slot>,
}

impl ResultOrchestrator {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self {
            backend,
            slot: Mutex::new(Slot {
                generation: 0,
                view: ArtifactsView::default(),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 使当前派生内容失效：清空视图，在途请求的结果将被丢弃
    pub fn invalidate(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        slot.view = ArtifactsView::default();
    }

    /// 当前可观察的结果面板状态
    pub fn view(&self) -> ArtifactsView {
        self.slot().view.clone()
    }

    /// 为一组段落加载派生内容
    ///
    /// 段落为空时不发请求。两个请求全部结束后返回最终视图；
    /// 期间若被 `invalidate` 或新的 `activate` 取代则返回 `None`
    pub async fn activate(&self, passages: Vec<Passage>) -> Option<ArtifactsView> {
        let loading = !passages.is_empty();
        let generation = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.view = ArtifactsView {
                insights_loading: loading,
                podcast_loading: loading,
                ..ArtifactsView::default()
            };
            slot.generation
        };

        if !loading {
            debug!("没有段落，跳过要点与音频摘要");
            return Some(self.view());
        }

        info!("✨ 为 {} 个段落请求要点与音频摘要", passages.len());

        let insights = async {
            let insights = self.backend.insights(&passages).await.unwrap_or_else(|e| {
                warn!("⚠️ 要点生成失败，不展示要点: {}", e);
                Vec::new()
            });
            let count = insights.len();
            if self.apply(generation, |view| {
                view.artifacts.insights = insights;
                view.insights_loading = false;
            }) {
                info!("✓ 要点已就绪 ({} 条)", count);
            }
        };

        let podcast = async {
            let podcast_url = self.backend.podcast(&passages).await.unwrap_or_else(|e| {
                warn!("⚠️ 音频摘要生成失败，不展示播放器: {}", e);
                None
            });
            let ready = podcast_url.is_some();
            if self.apply(generation, |view| {
                view.artifacts.podcast_url = podcast_url;
                view.podcast_loading = false;
            }) && ready
            {
                info!("✓ 音频摘要已就绪");
            }
        };

        tokio::join!(insights, podcast);

        let slot = self.slot();
        let current = (slot.generation == generation).then(|| slot.view.clone());
        current
    }

    /// 仅在代数未变化时写入
    fn apply(&self, generation: u64, update: impl FnOnce(&mut ArtifactsView)) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            debug!(
                "丢弃过期的派生内容 (代数 {} ≠ 当前 {})",
                generation, slot.generation
            );
            return false;
        }
        update(&mut slot.view);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Endpoint, FakeBackend};

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new("H1", "a.pdf", 1, "first").unwrap(),
            Passage::new("H2", "b.pdf", 4, "second").unwrap(),
        ]
    }

    #[tokio::test]
    async fn empty_passages_skip_both_requests() {
        let backend = Arc::new(FakeBackend::new());
        let orchestrator = ResultOrchestrator::new(backend.clone());

        let view = orchestrator.activate(Vec::new()).await.unwrap();

        assert!(view.is_settled());
        assert!(!view.shows_insights());
        assert!(!view.shows_player());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn both_artifacts_load_with_full_passage_list() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_insights(vec!["Point one".into(), "Point two".into()]);
        backend.set_podcast_url(Some("http://127.0.0.1:8000/podcasts/x.mp3"));
        let orchestrator = ResultOrchestrator::new(backend.clone());

        let view = orchestrator.activate(passages()).await.unwrap();

        assert_eq!(view.artifacts.insights, vec!["Point one", "Point two"]);
        assert_eq!(
            view.artifacts.podcast_url.as_deref(),
            Some("http://127.0.0.1:8000/podcasts/x.mp3")
        );
        assert!(view.shows_insights() && view.shows_player());
        assert_eq!(backend.count(Endpoint::Insights), 1);
        assert_eq!(backend.count(Endpoint::Podcast), 1);
        let calls = backend.calls();
        assert!(calls.contains(&Call::Insights(2)));
        assert!(calls.contains(&Call::Podcast(2)));
    }

    #[tokio::test]
    async fn insights_failure_does_not_block_podcast() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Endpoint::Insights, Some("LLM unavailable"));
        backend.set_podcast_url(Some("http://host/p.mp3"));
        let orchestrator = ResultOrchestrator::new(backend.clone());

        let view = orchestrator.activate(passages()).await.unwrap();

        assert!(view.artifacts.insights.is_empty());
        assert!(!view.shows_insights());
        assert_eq!(view.artifacts.podcast_url.as_deref(), Some("http://host/p.mp3"));
        assert!(view.is_settled());
    }

    #[tokio::test]
    async fn podcast_failure_leaves_url_absent() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Endpoint::Podcast, None);
        backend.set_insights(vec!["Only point".into()]);
        let orchestrator = ResultOrchestrator::new(backend.clone());

        let view = orchestrator.activate(passages()).await.unwrap();

        assert_eq!(view.artifacts.insights, vec!["Only point"]);
        assert!(!view.shows_player());
    }

    #[tokio::test]
    async fn loading_flags_are_independent() {
        let backend = Arc::new(FakeBackend::new());
        let gate = backend.hold(Endpoint::Podcast);
        backend.set_insights(vec!["Point".into()]);
        let orchestrator = Arc::new(ResultOrchestrator::new(backend.clone()));

        let task = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.activate(passages()).await }
        });

        while orchestrator.view().insights_loading || backend.count(Endpoint::Podcast) == 0 {
            tokio::task::yield_now().await;
        }
        let partial = orchestrator.view();
        assert!(partial.shows_insights());
        assert!(partial.podcast_loading);

        gate.notify_one();
        let view = task.await.unwrap().unwrap();
        assert!(view.is_settled());
    }

    #[tokio::test]
    async fn stale_completion_is_discarded() {
        let backend = Arc::new(FakeBackend::new());
        let gate = backend.hold(Endpoint::Insights);
        backend.set_insights(vec!["stale".into()]);
        let orchestrator = Arc::new(ResultOrchestrator::new(backend.clone()));

        let task = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.activate(passages()).await }
        });
        while backend.count(Endpoint::Insights) == 0 {
            tokio::task::yield_now().await;
        }

        // 离开结果阶段
        orchestrator.invalidate();
        gate.notify_one();

        assert_eq!(task.await.unwrap(), None);
        let view = orchestrator.view();
        assert!(view.artifacts.insights.is_empty());
        assert!(view.is_settled());
    }
}
