use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::error::AppResult;

/// 连接到已开启远程调试的浏览器，并打开阅读器宿主页面
///
/// 已有页面的地址与宿主页面一致时直接复用
pub async fn connect_to_browser_and_page(
    port: u16,
    host_url: &str,
) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if host_url != "about:blank" {
        for p in pages.iter() {
            if let Ok(Some(url)) = p.url().await {
                if url == host_url {
                    info!("✓ 复用已打开的阅读器页面: {}", url);
                    return Ok((browser, p.clone()));
                }
            }
        }
    }

    let page = browser.new_page(host_url).await.map_err(|e| {
        error!("创建阅读器页面失败 {}: {}", host_url, e);
        e
    })?;
    info!("已打开阅读器页面: {}", host_url);

    Ok((browser, page))
}
