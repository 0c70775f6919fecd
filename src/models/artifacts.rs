/// 由段落集合派生出的内容：要点列表 + 音频摘要
///
/// 仅在结果阶段存在，离开结果阶段即丢弃
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedArtifacts {
    /// 要点列表（保持后端返回顺序）
    pub insights: Vec<String>,
    /// 可播放的音频地址
    pub podcast_url: Option<String>,
}

/// 结果面板的可观察状态：派生内容 + 各自独立的加载标记
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactsView {
    pub artifacts: DerivedArtifacts,
    pub insights_loading: bool,
    pub podcast_loading: bool,
}

impl ArtifactsView {
    /// 要点面板是否渲染（空列表时不渲染，也不报错）
    pub fn shows_insights(&self) -> bool {
        !self.insights_loading && !self.artifacts.insights.is_empty()
    }

    /// 播放器是否渲染
    pub fn shows_player(&self) -> bool {
        !self.podcast_loading && self.artifacts.podcast_url.is_some()
    }

    pub fn is_settled(&self) -> bool {
        !self.insights_loading && !self.podcast_loading
    }
}
