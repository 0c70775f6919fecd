use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};

/// 启动浏览器并打开阅读器宿主页面
///
/// 阅读器需要用户选中文本，默认以有界面模式启动
pub async fn launch_browser(
    host_url: &str,
    headless: bool,
    executable: Option<&str>,
) -> AppResult<(Browser, Page)> {
    info!(
        "🚀 启动浏览器 ({})...",
        if headless { "无头模式" } else { "有界面模式" }
    );

    let mut builder = BrowserConfig::builder().args(vec![
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--remote-debugging-port=0",
    ]);
    builder = if headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(path) = executable {
        debug!("浏览器可执行文件: {}", path);
        builder = builder.chrome_executable(Path::new(path));
    }

    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        AppError::Launch(e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    sleep(Duration::from_millis(300)).await;

    let page = browser.new_page(host_url).await.map_err(|e| {
        error!("创建页面失败: {}", e);
        e
    })?;
    info!("✅ 浏览器已打开: {}", host_url);

    Ok((browser, page))
}
