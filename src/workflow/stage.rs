//! 阶段定义与各阶段的可渲染视图

use std::fmt;

use crate::models::{DocumentRef, KnowledgeSet, Passage};

/// 流程阶段，严格线性：知识库 → 焦点文档 → 查询 → 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    KnowledgeUpload,
    PrimaryUpload,
    Analysis,
    Results,
}

impl Stage {
    /// 该阶段是否要求已选定焦点文档
    pub fn requires_focus(self) -> bool {
        matches!(self, Stage::Analysis | Stage::Results)
    }

    /// "返回"对应的上一屏
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::KnowledgeUpload => None,
            Stage::PrimaryUpload => Some(Stage::KnowledgeUpload),
            Stage::Analysis => Some(Stage::PrimaryUpload),
            Stage::Results => Some(Stage::Analysis),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::KnowledgeUpload => "知识库上传",
            Stage::PrimaryUpload => "焦点文档上传",
            Stage::Analysis => "查询",
            Stage::Results => "结果",
        };
        f.write_str(name)
    }
}

/// 当前阶段应渲染的内容
///
/// 进入需要焦点文档的阶段但焦点文档缺失，或未经成功的查询进入结果阶段时，
/// 得到 `NoDocument` 恢复视图而不是错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageView<'a> {
    KnowledgeUpload {
        accepted: &'a KnowledgeSet,
    },
    PrimaryUpload {
        knowledge: &'a KnowledgeSet,
    },
    Analysis {
        focus: &'a DocumentRef,
        query_text: &'a str,
        can_submit: bool,
    },
    Results {
        focus: &'a DocumentRef,
        query_text: &'a str,
        passages: &'a [Passage],
    },
    /// 恢复视图：只提供返回第一阶段的出口
    NoDocument { requested: Stage },
}

impl StageView<'_> {
    pub fn is_recovery(&self) -> bool {
        matches!(self, StageView::NoDocument { .. })
    }
}
