use crate::models::document::DocumentRef;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一次会话要处理的文档与查询
///
/// ```toml
/// knowledge_files = ["papers/a.pdf", "papers/b.pdf"]
/// focus_file = "papers/focus.pdf"
/// query = "可选：不填时在阅读器中选中文本"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPlan {
    pub knowledge_files: Vec<PathBuf>,
    pub focus_file: PathBuf,
    #[serde(default)]
    pub query: Option<String>,
    /// 覆盖配置中的 top_k
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// 从 TOML 文件加载会话计划，相对路径以计划文件所在目录为基准
pub async fn load_session_plan(plan_path: &Path) -> Result<SessionPlan> {
    let content = fs::read_to_string(plan_path)
        .await
        .with_context(|| format!("无法读取会话计划: {}", plan_path.display()))?;

    let mut plan: SessionPlan = toml::from_str(&content)
        .with_context(|| format!("无法解析会话计划: {}", plan_path.display()))?;

    let base_dir = plan_path.parent().unwrap_or_else(|| Path::new("."));
    plan.knowledge_files = plan
        .knowledge_files
        .iter()
        .map(|p| resolve_relative(base_dir, p))
        .collect();
    plan.focus_file = resolve_relative(base_dir, &plan.focus_file);

    tracing::info!(
        "会话计划已加载: 知识库 {} 个文件, 焦点文档 {}",
        plan.knowledge_files.len(),
        plan.focus_file.display()
    );

    Ok(plan)
}

/// 依次读取文档，任何一个读取失败都整体失败
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<DocumentRef>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let document = DocumentRef::from_path(path).await?;
        tracing::debug!(
            "已读取文档 {} ({} 字节)",
            document.name(),
            document.content().len()
        );
        documents.push(document);
    }
    Ok(documents)
}

fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
