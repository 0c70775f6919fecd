//! 流程状态：阶段之间传递的全部数据集中在一个对象里

use crate::models::{DocumentRef, KnowledgeSet, KnownDocuments, Passage};
use crate::workflow::Stage;

/// 一次流程的状态
///
/// 只有 `WorkflowController` 能写入；`reset` 用 `Default` 整体替换
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub(crate) stage: Stage,
    pub(crate) knowledge_set: KnowledgeSet,
    pub(crate) focus: Option<DocumentRef>,
    pub(crate) query_text: String,
    pub(crate) passages: Vec<Passage>,
    /// 当前焦点文档是否完成过一次成功的查询
    pub(crate) searched: bool,
}

impl WorkflowState {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn knowledge_set(&self) -> &KnowledgeSet {
        &self.knowledge_set
    }

    pub fn focus(&self) -> Option<&DocumentRef> {
        self.focus.as_ref()
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// 按相关度排序的段落，顺序即展示顺序
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// 段落可以解析到的文档：焦点文档 ∪ 知识库
    pub fn known_documents(&self) -> KnownDocuments<'_> {
        KnownDocuments::new(self.focus.as_ref(), &self.knowledge_set)
    }

    pub fn has_searched(&self) -> bool {
        self.searched
    }

    pub fn is_pristine(&self) -> bool {
        self.stage == Stage::KnowledgeUpload
            && self.knowledge_set.is_empty()
            && self.focus.is_none()
            && self.query_text.is_empty()
            && self.passages.is_empty()
            && !self.searched
    }
}
