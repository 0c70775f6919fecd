/// 后端 API 客户端
///
/// 封装所有与上传 / 搜索 / 要点 / 播客服务相关的调用逻辑
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, ConfigError};
use crate::models::{DocumentRef, Passage, SearchRequest, SearchResponse};

pub const EMBED_KEY_PATH: &str = "config/adobe-key";
pub const UPLOAD_BULK_PATH: &str = "ingest/upload_bulk";
pub const UPLOAD_SINGLE_PATH: &str = "ingest/upload_single";
pub const SEARCH_PATH: &str = "search/";
pub const INSIGHTS_PATH: &str = "insights/";
pub const PODCAST_PATH: &str = "podcast/";
pub const HEALTH_PATH: &str = "api/health";

/// 后端服务能力
///
/// 流程层、阅读器和结果编排都只依赖这个 trait，测试中用内存替身实现
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// 获取渲染引擎的嵌入凭证
    async fn fetch_embed_key(&self) -> Result<String, ApiError>;

    /// 批量上传知识库文档（multipart，重复的 `files` 字段）
    async fn upload_bulk(&self, files: &[DocumentRef]) -> Result<(), ApiError>;

    /// 上传焦点文档（multipart，`file` 字段）
    async fn upload_single(&self, file: &DocumentRef) -> Result<(), ApiError>;

    /// 搜索相关段落
    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, ApiError>;

    /// 由段落生成要点列表
    async fn insights(&self, passages: &[Passage]) -> Result<Vec<String>, ApiError>;

    /// 由段落生成音频摘要，返回可播放地址
    async fn podcast(&self, passages: &[Passage]) -> Result<Option<String>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct EmbedKeyResponse {
    adobe_embed_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightsResponse {
    insights: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PodcastResponse {
    #[serde(default)]
    podcast_url: Option<String>,
}

/// 基于 reqwest 的后端客户端
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&config.backend_base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 检查后端是否在线
    pub async fn health(&self) -> Result<(), ApiError> {
        let request = self.http.get(self.endpoint(HEALTH_PATH)?);
        self.send(HEALTH_PATH, request).await?;
        Ok(())
    }

    /// 把后端返回的相对媒体地址（如 `/podcasts/x.mp3`）解析为绝对地址
    pub fn resolve_media_url(&self, url: &str) -> String {
        match Url::parse(url) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => self
                .base_url
                .join(url.trim_start_matches('/'))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string()),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::MalformedPayload {
                endpoint: path.to_string(),
                message: format!("无法拼接请求地址: {}", e),
            })
    }

    /// 发送请求，非成功状态转换为 `ApiError::Rejected`
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            warn!("请求 {} 失败: {}", endpoint, e);
            ApiError::RequestFailed {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        warn!(
            "请求 {} 返回 {}: {}",
            endpoint,
            status.as_u16(),
            detail.as_deref().unwrap_or("<无 detail>")
        );
        Err(ApiError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            detail,
        })
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let bytes = response.bytes().await.map_err(|e| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            source: Box::new(e),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::MalformedPayload {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn fetch_embed_key(&self) -> Result<String, ApiError> {
        let request = self.http.get(self.endpoint(EMBED_KEY_PATH)?);
        let response = self.send(EMBED_KEY_PATH, request).await?;
        let body: EmbedKeyResponse = Self::decode(EMBED_KEY_PATH, response).await?;

        body.adobe_embed_api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiError::MalformedPayload {
                endpoint: EMBED_KEY_PATH.to_string(),
                message: "adobe_embed_api_key 为空".to_string(),
            })
    }

    async fn upload_bulk(&self, files: &[DocumentRef]) -> Result<(), ApiError> {
        debug!("批量上传 {} 个文档", files.len());
        let mut form = Form::new();
        for file in files {
            form = form.part("files", pdf_part(UPLOAD_BULK_PATH, file)?);
        }

        let request = self.http.post(self.endpoint(UPLOAD_BULK_PATH)?).multipart(form);
        self.send(UPLOAD_BULK_PATH, request).await?;
        Ok(())
    }

    async fn upload_single(&self, file: &DocumentRef) -> Result<(), ApiError> {
        debug!("上传焦点文档 {} ({} 字节)", file.name(), file.content().len());
        let form = Form::new().part("file", pdf_part(UPLOAD_SINGLE_PATH, file)?);

        let request = self.http.post(self.endpoint(UPLOAD_SINGLE_PATH)?).multipart(form);
        self.send(UPLOAD_SINGLE_PATH, request).await?;
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, ApiError> {
        debug!("搜索: 查询长度 {} 字符, top_k={}", query.chars().count(), top_k);
        let request = self
            .http
            .post(self.endpoint(SEARCH_PATH)?)
            .json(&SearchRequest { query, top_k });
        let response = self.send(SEARCH_PATH, request).await?;
        Self::decode(SEARCH_PATH, response).await
    }

    async fn insights(&self, passages: &[Passage]) -> Result<Vec<String>, ApiError> {
        let request = self.http.post(self.endpoint(INSIGHTS_PATH)?).json(passages);
        let response = self.send(INSIGHTS_PATH, request).await?;
        let body: InsightsResponse = Self::decode(INSIGHTS_PATH, response).await?;
        Ok(body.insights)
    }

    async fn podcast(&self, passages: &[Passage]) -> Result<Option<String>, ApiError> {
        let request = self.http.post(self.endpoint(PODCAST_PATH)?).json(passages);
        let response = self.send(PODCAST_PATH, request).await?;
        let body: PodcastResponse = Self::decode(PODCAST_PATH, response).await?;
        Ok(body
            .podcast_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| self.resolve_media_url(&url)))
    }
}

fn pdf_part(endpoint: &str, file: &DocumentRef) -> Result<Part, ApiError> {
    Part::bytes(file.content().to_vec())
        .file_name(file.name().to_string())
        .mime_str("application/pdf")
        .map_err(|e| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            source: Box::new(e),
        })
}

/// 基础地址统一以 `/` 结尾，保证相对路径拼接时不丢失前缀
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| ConfigError::InvalidUrl {
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// 从错误响应体中提取 `detail`
///
/// FastAPI 的校验错误里 `detail` 可能是数组，此时保留其 JSON 文本
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        let config = Config {
            backend_base_url: base.to_string(),
            ..Config::default()
        };
        BackendClient::new(&config).unwrap()
    }

    #[test]
    fn detail_extraction() {
        assert_eq!(
            extract_detail(r#"{"detail": "No index loaded"}"#).as_deref(),
            Some("No index loaded")
        );
        assert_eq!(extract_detail(r#"{"detail": null}"#), None);
        assert_eq!(extract_detail(r#"{"message": "x"}"#), None);
        assert_eq!(extract_detail("Internal Server Error"), None);
        assert_eq!(
            extract_detail(r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#)
                .as_deref(),
            Some(r#"[{"loc":["body"],"msg":"field required"}]"#)
        );
    }

    #[test]
    fn endpoints_keep_base_prefix() {
        let c = client("http://127.0.0.1:8000");
        assert_eq!(
            c.endpoint(SEARCH_PATH).unwrap().as_str(),
            "http://127.0.0.1:8000/search/"
        );

        let prefixed = client("http://host/backend");
        assert_eq!(
            prefixed.endpoint(UPLOAD_BULK_PATH).unwrap().as_str(),
            "http://host/backend/ingest/upload_bulk"
        );
    }

    #[test]
    fn media_urls_are_made_absolute() {
        let c = client("http://127.0.0.1:8000");
        assert_eq!(
            c.resolve_media_url("/podcasts/abc.mp3"),
            "http://127.0.0.1:8000/podcasts/abc.mp3"
        );
        assert_eq!(
            c.resolve_media_url("https://cdn.example.com/p.mp3"),
            "https://cdn.example.com/p.mp3"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let config = Config {
            backend_base_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            BackendClient::new(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_request_failure() {
        // 端口 9 (discard) 在测试环境中通常无人监听
        let c = client("http://127.0.0.1:9");
        let err = c.search("q", 3).await.unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed { .. }));
        assert_eq!(err.user_message("Search request failed."), "Search request failed.");
    }
}
