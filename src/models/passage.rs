//! 搜索返回的段落
//!
//! 线上字段名大小写敏感：`Header` / `PDF_Name` / `Page` / `Content`，
//! 在边界上做严格校验，不合法的载荷直接拒绝。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::document::file_name_of;

/// 段落校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassageError {
    #[error("页码必须 ≥ 1，实际为 {0}")]
    InvalidPage(i64),
    #[error("PDF_Name 不能为空")]
    EmptySource,
}

/// 搜索结果中的一个段落
///
/// 段落列表的顺序就是相关性顺序，也是显示顺序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PassageWire", into = "PassageWire")]
pub struct Passage {
    header: String,
    source_path: String,
    page: u32,
    content: String,
}

impl Passage {
    pub fn new(
        header: impl Into<String>,
        source_path: impl Into<String>,
        page: i64,
        content: impl Into<String>,
    ) -> Result<Self, PassageError> {
        let source_path = source_path.into();
        if file_name_of(&source_path).is_empty() {
            return Err(PassageError::EmptySource);
        }
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or(PassageError::InvalidPage(page))?;
        Ok(Self {
            header: header.into(),
            source_path,
            page,
            content: content.into(),
        })
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// 后端给出的原始来源（可能是完整路径）
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// 来源文档名（路径最后一段），显示与匹配共用
    pub fn source_document_name(&self) -> &str {
        file_name_of(&self.source_path)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// 线上格式
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PassageWire {
    #[serde(rename = "Header")]
    header: String,
    #[serde(rename = "PDF_Name")]
    pdf_name: String,
    #[serde(rename = "Page")]
    page: i64,
    #[serde(rename = "Content")]
    content: String,
}

impl TryFrom<PassageWire> for Passage {
    type Error = PassageError;

    fn try_from(wire: PassageWire) -> Result<Self, Self::Error> {
        Passage::new(wire.header, wire.pdf_name, wire.page, wire.content)
    }
}

impl From<Passage> for PassageWire {
    fn from(passage: Passage) -> Self {
        Self {
            header: passage.header,
            pdf_name: passage.source_path,
            page: i64::from(passage.page),
            content: passage.content,
        }
    }
}

/// 搜索请求体
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub top_k: usize,
}

/// 搜索响应体
///
/// `results` 缺失或为 null 时保持为 `None`，由流程层统一规范化为空列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Option<Vec<Passage>>,
}
