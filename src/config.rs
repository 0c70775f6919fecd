use std::str::FromStr;

use tracing::warn;

/// 找不到文档内容时阅读器加载的示例文档
pub const SAMPLE_DOCUMENT_URL: &str =
    "https://acrobatservices.adobe.com/view-sdk-demo/PDFs/Bodea Brochure.pdf";

/// 示例文档的显示名
pub const SAMPLE_DOCUMENT_NAME: &str = "Sample.pdf";

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 后端服务 ---
    /// 后端服务根地址
    pub backend_base_url: String,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 搜索返回的段落数量
    pub search_top_k: usize,
    // --- 浏览器 / 阅读器 ---
    /// 浏览器调试端口（连接已打开的浏览器时使用）
    pub browser_debug_port: u16,
    /// 是否自行启动浏览器而不是连接已有实例
    pub launch_browser: bool,
    /// 自行启动时是否使用无头模式
    pub headless: bool,
    /// 浏览器可执行文件路径（为空时由 chromiumoxide 自动探测）
    pub browser_executable: Option<String>,
    /// 阅读器宿主页面
    pub viewer_host_url: String,
    /// 渲染引擎 SDK 脚本地址
    pub viewer_sdk_url: String,
    /// 阅读器容器元素 id
    pub viewer_container_id: String,
    /// 等待渲染引擎就绪的超时（秒）
    pub viewer_ready_timeout_secs: u64,
    /// 没有文档内容时的示例文档
    pub viewer_fallback_url: String,
    /// 切换文档后是否补发翻页
    pub follow_up_navigation: bool,
    // --- 会话 / 日志 ---
    /// 会话计划文件
    pub session_plan_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 300,
            search_top_k: 3,
            browser_debug_port: 9222,
            launch_browser: true,
            headless: false,
            browser_executable: None,
            viewer_host_url: "about:blank".to_string(),
            viewer_sdk_url: "https://acrobatservices.adobe.com/view-sdk/viewer.js".to_string(),
            viewer_container_id: "adobe-dc-view".to_string(),
            viewer_ready_timeout_secs: 30,
            viewer_fallback_url: SAMPLE_DOCUMENT_URL.to_string(),
            follow_up_navigation: true,
            session_plan_file: "session.toml".to_string(),
            verbose_logging: false,
            output_log_file: "doc_insight.log".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            backend_base_url: env_string("BACKEND_BASE_URL", default.backend_base_url),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            search_top_k: env_parse("SEARCH_TOP_K", default.search_top_k),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port),
            launch_browser: env_parse("LAUNCH_BROWSER", default.launch_browser),
            headless: env_parse("HEADLESS", default.headless),
            browser_executable: std::env::var("BROWSER_EXECUTABLE")
                .ok()
                .or(default.browser_executable),
            viewer_host_url: env_string("VIEWER_HOST_URL", default.viewer_host_url),
            viewer_sdk_url: env_string("VIEWER_SDK_URL", default.viewer_sdk_url),
            viewer_container_id: env_string("VIEWER_CONTAINER_ID", default.viewer_container_id),
            viewer_ready_timeout_secs: env_parse(
                "VIEWER_READY_TIMEOUT_SECS",
                default.viewer_ready_timeout_secs,
            ),
            viewer_fallback_url: env_string("VIEWER_FALLBACK_URL", default.viewer_fallback_url),
            follow_up_navigation: env_parse("FOLLOW_UP_NAVIGATION", default.follow_up_navigation),
            session_plan_file: env_string("SESSION_PLAN_FILE", default.session_plan_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            output_log_file: env_string("OUTPUT_LOG_FILE", default.output_log_file),
        }
    }
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

/// 读取并解析环境变量，缺失或无法解析时使用默认值
fn env_parse<T: FromStr>(var_name: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(
                "环境变量 {} 的值 '{}' 无法解析为 {}，使用默认值",
                var_name,
                value,
                std::any::type_name::<T>()
            );
            default
        }),
        Err(_) => default,
    }
}
