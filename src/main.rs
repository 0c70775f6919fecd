use std::path::PathBuf;

use anyhow::Result;
use doc_insight::models::load_session_plan;
use doc_insight::utils::logging;
use doc_insight::{App, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 加载配置
    let mut config = Config::from_env();

    // 初始化日志
    logging::init(&config)?;

    // 会话计划：命令行参数优先，其次是配置
    let plan_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.session_plan_file));
    let plan = load_session_plan(&plan_path).await?;
    if let Some(top_k) = plan.top_k {
        config.search_top_k = top_k;
    }

    // 初始化并运行应用
    let mut app = App::initialize(config).await?;
    app.run(&plan).await
}
