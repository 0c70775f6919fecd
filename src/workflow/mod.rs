//! 流程层
//!
//! 四阶段状态机：持有阶段间传递的数据，决定何时调用后端、何时推进阶段。
//! 不持有页面资源，阅读器通过参数传入。

pub mod controller;
pub mod request_token;
pub mod stage;
pub mod state;

pub use controller::{WorkflowController, PROCESS_FAILED, SEARCH_FAILED, UPLOAD_FAILED};
pub use request_token::{InFlight, RequestToken};
pub use stage::{Stage, StageView};
pub use state::WorkflowState;
