//! JS 执行器 - 基础设施层
//!
//! 持有阅读器所在的 page 资源，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::ViewerError;

/// JS 执行器
///
/// 职责：
/// - 持有阅读器页面
/// - 暴露 eval() 能力
/// - 不认识文档 / 段落
/// - 不处理流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本必须返回非 null 的值，Promise 会被等待
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, ViewerError> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, ViewerError> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 以 JSON 字面量的形式把参数嵌入脚本
    ///
    /// 脚本中的 `__ARGS__` 占位符会被替换为序列化后的参数，避免手工拼接转义
    pub async fn call_as<A: Serialize, T: DeserializeOwned>(
        &self,
        script_template: &str,
        args: &A,
    ) -> Result<T, ViewerError> {
        let literal = serde_json::to_string(args)?;
        self.eval_as(script_template.replace("__ARGS__", &literal))
            .await
    }
}
