pub mod adobe_engine;
pub mod js_executor;

pub use adobe_engine::AdobeEmbedEngine;
pub use js_executor::JsExecutor;
