//! 文档引用与知识库集合
//!
//! 文档在一个会话内只按名字识别，名字统一取路径的最后一段

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// 取路径的最后一段作为文件名
///
/// 后端返回的 `PDF_Name` 可能是完整路径（如 `store/pdfs/a.pdf`），
/// 显示与匹配都必须使用同一个规范化结果。
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// 已上传文档的引用
///
/// 创建后不可变；内容是共享的字节句柄，克隆成本很低
#[derive(Clone)]
pub struct DocumentRef {
    name: String,
    content: Arc<[u8]>,
}

impl DocumentRef {
    /// 创建文档引用，`name` 可以是路径，只保留文件名部分
    pub fn new(name: impl AsRef<str>, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: file_name_of(name.as_ref()).to_string(),
            content: content.into(),
        }
    }

    /// 从本地文件读取文档
    pub async fn from_path(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("无法读取文档: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("路径没有文件名: {}", path.display()))?;
        Ok(Self::new(name, content))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// 共享的内容句柄
    pub fn content_handle(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// 是否就是 `name` 所指的文档（大小写敏感，先规范化）
    pub fn matches(&self, name: &str) -> bool {
        self.name == file_name_of(name)
    }
}

impl PartialEq for DocumentRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DocumentRef {}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRef")
            .field("name", &self.name)
            .field("bytes", &self.content.len())
            .finish()
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 知识库文档集合
///
/// 保持上传顺序，按名字去重：名字已存在的后续文档被静默丢弃
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeSet {
    documents: Vec<DocumentRef>,
}

impl KnowledgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个文档，名字重复时返回 false
    pub fn insert(&mut self, document: DocumentRef) -> bool {
        if self.contains(document.name()) {
            return false;
        }
        self.documents.push(document);
        true
    }

    /// 返回合并后的新集合，自身保持不变
    pub fn merged_with(&self, incoming: impl IntoIterator<Item = DocumentRef>) -> Self {
        let mut merged = self.clone();
        for document in incoming {
            merged.insert(document);
        }
        merged
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn find(&self, name: &str) -> Option<&DocumentRef> {
        self.documents.iter().find(|d| d.matches(name))
    }

    pub fn documents(&self) -> &[DocumentRef] {
        &self.documents
    }

    pub fn names(&self) -> Vec<&str> {
        self.documents.iter().map(DocumentRef::name).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// 会话内已知的全部文档：焦点文档 ∪ 知识库
#[derive(Debug, Clone, Copy)]
pub struct KnownDocuments<'a> {
    focus: Option<&'a DocumentRef>,
    knowledge: &'a KnowledgeSet,
}

impl<'a> KnownDocuments<'a> {
    pub fn new(focus: Option<&'a DocumentRef>, knowledge: &'a KnowledgeSet) -> Self {
        Self { focus, knowledge }
    }

    /// 按名字解析文档，焦点文档优先
    pub fn resolve(&self, name: &str) -> Option<&'a DocumentRef> {
        self.focus
            .filter(|focus| focus.matches(name))
            .or_else(|| self.knowledge.find(name))
    }

    pub fn contains(&self, document: &DocumentRef) -> bool {
        self.resolve(document.name()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::new(name, name.as_bytes().to_vec())
    }

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name_of("docs/a.pdf"), "a.pdf");
        assert_eq!(file_name_of("store/pdfs/Report 2024.pdf"), "Report 2024.pdf");
        assert_eq!(file_name_of(r"C:\papers\b.pdf"), "b.pdf");
        assert_eq!(file_name_of("plain.pdf"), "plain.pdf");
        assert_eq!(file_name_of(""), "");
    }

    #[test]
    fn document_name_is_normalized() {
        let d = DocumentRef::new("uploads/nested/c.pdf", Vec::new());
        assert_eq!(d.name(), "c.pdf");
        assert!(d.matches("store/pdfs/c.pdf"));
        assert!(!d.matches("C.pdf"));
        assert!(!d.has_content());
    }

    #[test]
    fn later_duplicates_are_dropped() {
        let mut set = KnowledgeSet::new();
        assert!(set.insert(doc("a.pdf")));
        assert!(!set.insert(DocumentRef::new("a.pdf", b"other".to_vec())));
        assert_eq!(set.len(), 1);
        assert_eq!(set.find("a.pdf").map(|d| d.content()), Some(&b"a.pdf"[..]));
    }

    #[test]
    fn merge_adds_only_new_names_in_order() {
        let set = KnowledgeSet::new().merged_with(vec![doc("a.pdf")]);
        let merged = set.merged_with(vec![doc("a.pdf"), doc("b.pdf"), doc("b.pdf")]);
        assert_eq!(merged.names(), vec!["a.pdf", "b.pdf"]);
        // 原集合不受影响
        assert_eq!(set.names(), vec!["a.pdf"]);
    }

    #[test]
    fn known_documents_prefer_focus() {
        let knowledge = KnowledgeSet::new().merged_with(vec![doc("a.pdf"), doc("b.pdf")]);
        let focus = DocumentRef::new("a.pdf", b"focus".to_vec());
        let known = KnownDocuments::new(Some(&focus), &knowledge);

        assert_eq!(known.resolve("a.pdf").map(|d| d.content()), Some(&b"focus"[..]));
        assert_eq!(known.resolve("docs/b.pdf").map(|d| d.name()), Some("b.pdf"));
        assert!(known.resolve("missing.pdf").is_none());
        assert!(known.contains(&doc("b.pdf")));
    }
}
