mod connection;
mod launch;

pub use connection::connect_to_browser_and_page;
pub use launch::launch_browser;

use chromiumoxide::{Browser, Page};

use crate::config::Config;
use crate::error::AppResult;

/// 按配置启动或连接浏览器，返回阅读器所在的页面
pub async fn open_viewer_page(config: &Config) -> AppResult<(Browser, Page)> {
    if config.launch_browser {
        launch_browser(
            &config.viewer_host_url,
            config.headless,
            config.browser_executable.as_deref(),
        )
        .await
    } else {
        connect_to_browser_and_page(config.browser_debug_port, &config.viewer_host_url).await
    }
}
