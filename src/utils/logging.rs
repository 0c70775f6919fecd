/// 日志工具模块
///
/// 初始化 tracing 订阅者，并提供日志格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::models::{ArtifactsView, Passage};
use crate::workflow::Stage;

/// 初始化日志：控制台 + 会话日志文件
///
/// 级别由 `RUST_LOG` 决定，未设置时按 `verbose_logging` 取 debug 或 info
pub fn init(config: &Config) -> Result<()> {
    init_log_file(&config.output_log_file)?;
    let file = OpenOptions::new()
        .append(true)
        .open(&config.output_log_file)
        .with_context(|| format!("无法打开日志文件: {}", config.output_log_file))?;

    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| anyhow!("初始化日志失败: {}", e))
}

/// 初始化日志文件（覆盖旧内容并写入会话头）
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n文档洞察会话日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文档洞察助手");
    info!("🌐 后端地址: {}", config.backend_base_url);
    info!("🔢 搜索 top_k: {}", config.search_top_k);
    info!(
        "🔀 切换文档后补发翻页: {}",
        if config.follow_up_navigation { "是" } else { "否" }
    );
    info!("{}", "=".repeat(60));
}

/// 记录阶段切换
pub fn log_stage(stage: Stage) {
    info!("\n{}", "─".repeat(60));
    info!("📍 当前阶段: {}", stage);
    info!("{}", "─".repeat(60));
}

/// 按相关度顺序列出段落
pub fn log_passages(passages: &[Passage]) {
    if passages.is_empty() {
        info!("（没有相关段落）");
        return;
    }
    for (idx, passage) in passages.iter().enumerate() {
        info!(
            "[{}] {} · {} 第 {} 页",
            idx + 1,
            passage.header(),
            passage.source_document_name(),
            passage.page()
        );
        info!("    {}", truncate_text(passage.content(), 120));
    }
}

/// 打印结果面板
pub fn log_artifacts(view: &ArtifactsView) {
    if view.insights_loading {
        info!("💡 要点: 生成中...");
    } else if view.shows_insights() {
        info!("💡 要点:");
        for insight in &view.artifacts.insights {
            info!("  • {}", insight);
        }
    }

    if view.podcast_loading {
        info!("🎧 音频摘要: 生成中...");
    } else if let Some(url) = &view.artifacts.podcast_url {
        info!("🎧 音频摘要: {}", url);
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
