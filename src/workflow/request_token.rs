//! 提交请求的单一持有者令牌

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::WorkflowError;

/// 在途请求标记
///
/// 同一时刻最多一个提交请求持有令牌；克隆出的句柄共享同一个标记，可用于展示忙碌状态
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地检查并占用，已被占用时返回 `WorkflowError::Busy`
    pub fn try_acquire(&self) -> Result<RequestToken, WorkflowError> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(RequestToken {
            flag: Arc::clone(&self.flag),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// 令牌在 drop 时释放，无论请求成功、失败还是被取消
#[derive(Debug)]
pub struct RequestToken {
    flag: Arc<AtomicBool>,
}

impl Drop for RequestToken {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
