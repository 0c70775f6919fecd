//! Adobe 嵌入式阅读器 - 基础设施层
//!
//! 通过 JsExecutor 在阅读器页面里驱动 AdobeDC View SDK。
//! 页面侧的状态统一挂在 `window.__docInsight` 上。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ViewerError;
use crate::infrastructure::JsExecutor;
use crate::services::viewer_bridge::{DocumentSource, NavigationHandle, OpenRequest, RenderEngine};

/// 页面侧事件的轮询间隔
///
/// 每次 evaluate 都很短，不会碰到 CDP 单条命令的超时
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 挂载容器、注入 SDK 脚本、登记就绪事件监听
const INSTALL_SCRIPT: &str = r#"
(() => {
    const args = __ARGS__;
    let container = document.getElementById(args.containerId);
    if (!container) {
        container = document.createElement('div');
        container.id = args.containerId;
        container.style.height = '100vh';
        document.body.appendChild(container);
    }
    if (!window.__docInsight) {
        window.__docInsight = { apis: null, viewerId: 0, sdkReady: false, releases: 0 };
        document.addEventListener('adobe_dc_view_sdk.ready', () => {
            window.__docInsight.sdkReady = true;
        });
        window.addEventListener('mouseup', () => {
            window.__docInsight.releases += 1;
        }, true);
    }
    if (!document.querySelector('script[data-doc-insight-sdk]')) {
        const script = document.createElement('script');
        script.src = args.sdkUrl;
        script.dataset.docInsightSdk = '1';
        document.head.appendChild(script);
    }
    return { ok: true };
})()
"#;

const PROBE_SCRIPT: &str = r#"
(() => ({ ok: !!(window.AdobeDC && window.AdobeDC.View) }))()
"#;

const READY_SCRIPT: &str = r#"
(() => {
    const state = window.__docInsight;
    return { ok: !!((window.AdobeDC && window.AdobeDC.View) || (state && state.sdkReady)) };
})()
"#;

const TEARDOWN_SCRIPT: &str = r#"
(() => {
    const args = __ARGS__;
    const container = document.getElementById(args.containerId);
    if (container) {
        container.innerHTML = '';
    }
    if (window.__docInsight) {
        window.__docInsight.apis = null;
        window.__docInsight.viewerId = 0;
    }
    return { ok: true };
})()
"#;

const OPEN_SCRIPT: &str = r#"
(async () => {
    const args = __ARGS__;
    const state = window.__docInsight;
    try {
        const view = new window.AdobeDC.View({ clientId: args.clientId, divId: args.containerId });
        let content;
        if (args.base64) {
            const binary = atob(args.base64);
            const bytes = new Uint8Array(binary.length);
            for (let i = 0; i < binary.length; i++) {
                bytes[i] = binary.charCodeAt(i);
            }
            content = { promise: Promise.resolve(bytes.buffer) };
        } else {
            content = { location: { url: args.url } };
        }
        const viewer = await view.previewFile(
            { content, metaData: { fileName: args.fileName } },
            { embedMode: 'SIZED_CONTAINER' }
        );
        state.apis = await viewer.getAPIs();
        state.viewerId = args.viewerId;
        return { ok: true };
    } catch (e) {
        return { ok: false, error: String((e && e.message) || e) };
    }
})()
"#;

const SELECTION_SCRIPT: &str = r#"
(async () => {
    const args = __ARGS__;
    const state = window.__docInsight;
    if (!state || !state.apis || state.viewerId !== args.viewerId) {
        return { ok: false, error: 'viewer is not bound' };
    }
    try {
        const result = await state.apis.getSelectedContent();
        return { ok: true, text: (result && result.data) ? String(result.data) : '' };
    } catch (e) {
        return { ok: false, error: String((e && e.message) || e) };
    }
})()
"#;

const GOTO_SCRIPT: &str = r#"
(async () => {
    const args = __ARGS__;
    const state = window.__docInsight;
    if (!state || !state.apis || state.viewerId !== args.viewerId) {
        return { ok: false, error: 'viewer is not bound' };
    }
    try {
        await state.apis.gotoLocation(args.page);
        return { ok: true };
    } catch (e) {
        return { ok: false, error: String((e && e.message) || e) };
    }
})()
"#;

/// 页面记录的指针释放次数
const RELEASE_COUNT_SCRIPT: &str = r#"
(() => {
    const state = window.__docInsight;
    return { ok: true, count: state ? state.releases : 0 };
})()
"#;

/// 页面脚本的统一返回结构
#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    count: Option<u64>,
}

impl ScriptOutcome {
    fn into_result(self) -> Result<Option<String>, ViewerError> {
        if self.ok {
            Ok(self.text)
        } else {
            Err(ViewerError::Engine(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenArgs<'a> {
    client_id: &'a str,
    container_id: &'a str,
    file_name: &'a str,
    viewer_id: u64,
    base64: Option<String>,
    url: Option<&'a str>,
}

/// 基于 AdobeDC View SDK 的渲染引擎
pub struct AdobeEmbedEngine {
    executor: JsExecutor,
    container_id: String,
    next_viewer_id: AtomicU64,
}

impl AdobeEmbedEngine {
    /// 在页面中准备渲染容器并注入 SDK 脚本
    ///
    /// SDK 脚本异步到达，是否就绪由 `ViewerBridge` 的就绪闸门判断
    pub async fn attach(executor: JsExecutor, config: &Config) -> Result<Self, ViewerError> {
        let outcome: ScriptOutcome = executor
            .call_as(
                INSTALL_SCRIPT,
                &json!({
                    "containerId": config.viewer_container_id,
                    "sdkUrl": config.viewer_sdk_url,
                }),
            )
            .await?;
        outcome.into_result()?;
        info!("✓ 阅读器容器已就位，SDK 脚本: {}", config.viewer_sdk_url);

        Ok(Self {
            executor,
            container_id: config.viewer_container_id.clone(),
            next_viewer_id: AtomicU64::new(1),
        })
    }

    async fn release_count(&self) -> Result<u64, ViewerError> {
        let outcome: ScriptOutcome = self.executor.eval_as(RELEASE_COUNT_SCRIPT).await?;
        Ok(outcome.count.unwrap_or(0))
    }
}

#[async_trait]
impl RenderEngine for AdobeEmbedEngine {
    async fn is_loaded(&self) -> Result<bool, ViewerError> {
        let outcome: ScriptOutcome = self.executor.eval_as(PROBE_SCRIPT).await?;
        Ok(outcome.ok)
    }

    /// 轮询就绪标记，等待时长由调用方的超时决定
    async fn ready_event(&self) -> Result<(), ViewerError> {
        loop {
            let outcome: ScriptOutcome = self.executor.eval_as(READY_SCRIPT).await?;
            if outcome.ok {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn teardown(&self) -> Result<(), ViewerError> {
        let outcome: ScriptOutcome = self
            .executor
            .call_as(TEARDOWN_SCRIPT, &json!({ "containerId": self.container_id }))
            .await?;
        outcome.into_result().map(|_| ())
    }

    async fn open(&self, request: OpenRequest) -> Result<Box<dyn NavigationHandle>, ViewerError> {
        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::SeqCst);
        let (base64, url) = match &request.source {
            DocumentSource::Bytes(bytes) => (
                Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
                None,
            ),
            DocumentSource::Url(url) => (None, Some(url.as_str())),
        };
        debug!(
            "打开文档 {} (viewer #{}, 内联: {})",
            request.display_name,
            viewer_id,
            base64.is_some()
        );

        let args = OpenArgs {
            client_id: &request.client_id,
            container_id: &self.container_id,
            file_name: &request.display_name,
            viewer_id,
            base64,
            url,
        };
        let outcome: ScriptOutcome = self.executor.call_as(OPEN_SCRIPT, &args).await?;
        outcome.into_result()?;

        Ok(Box::new(AdobeNavigation {
            executor: self.executor.clone(),
            viewer_id,
        }))
    }

    /// 以调用时的释放计数为基准，轮询到计数增加为止
    async fn pointer_released(&self) -> Result<(), ViewerError> {
        let baseline = self.release_count().await?;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if self.release_count().await? > baseline {
                return Ok(());
            }
        }
    }
}

/// 绑定到某一次 `open` 的导航句柄
///
/// 渲染面重建后旧句柄的 viewer id 不再匹配，调用会返回错误而不是作用到新文档上
struct AdobeNavigation {
    executor: JsExecutor,
    viewer_id: u64,
}

#[async_trait]
impl NavigationHandle for AdobeNavigation {
    async fn selected_content(&self) -> Result<Option<String>, ViewerError> {
        let outcome: ScriptOutcome = self
            .executor
            .call_as(SELECTION_SCRIPT, &json!({ "viewerId": self.viewer_id }))
            .await?;
        Ok(outcome.into_result()?.filter(|text| !text.is_empty()))
    }

    async fn goto_location(&self, page: u32) -> Result<(), ViewerError> {
        let outcome: ScriptOutcome = self
            .executor
            .call_as(
                GOTO_SCRIPT,
                &json!({ "viewerId": self.viewer_id, "page": page }),
            )
            .await?;
        outcome.into_result().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_outcome_maps_failures() {
        let ok: ScriptOutcome =
            serde_json::from_value(json!({ "ok": true, "text": "abc" })).unwrap();
        assert_eq!(ok.into_result().unwrap().as_deref(), Some("abc"));

        let failed: ScriptOutcome =
            serde_json::from_value(json!({ "ok": false, "error": "no selection" })).unwrap();
        assert!(matches!(
            failed.into_result(),
            Err(ViewerError::Engine(msg)) if msg == "no selection"
        ));
    }

    #[test]
    fn open_args_use_camel_case() {
        let args = OpenArgs {
            client_id: "key",
            container_id: "adobe-dc-view",
            file_name: "a.pdf",
            viewer_id: 3,
            base64: Some("JVBERg==".to_string()),
            url: None,
        };
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value["clientId"], "key");
        assert_eq!(value["containerId"], "adobe-dc-view");
        assert_eq!(value["fileName"], "a.pdf");
        assert_eq!(value["viewerId"], 3);
        assert!(value["url"].is_null());
    }

    #[test]
    fn scripts_carry_args_placeholder() {
        for script in [
            INSTALL_SCRIPT,
            TEARDOWN_SCRIPT,
            OPEN_SCRIPT,
            SELECTION_SCRIPT,
            GOTO_SCRIPT,
        ] {
            assert!(script.contains("__ARGS__"));
        }
    }

    #[test]
    fn release_count_defaults_to_zero() {
        let outcome: ScriptOutcome =
            serde_json::from_value(json!({ "ok": true, "count": 4 })).unwrap();
        assert_eq!(outcome.count, Some(4));

        let missing: ScriptOutcome = serde_json::from_value(json!({ "ok": true })).unwrap();
        assert_eq!(missing.count, None);
    }

    #[test]
    fn polled_scripts_return_immediately() {
        // 轮询脚本不能等待页面事件
        for script in [READY_SCRIPT, RELEASE_COUNT_SCRIPT, PROBE_SCRIPT] {
            assert!(!script.contains("Promise"));
            assert!(!script.contains("async"));
        }
    }
}
