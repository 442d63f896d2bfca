use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(100);

/// loader 内部 panic 的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// 视为 loader 错误，结束本次运行
    #[default]
    Fail,
    /// 只记录日志，节点视为未完成
    Swallow,
}

/// 阶段内 loader 出错时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorPolicy {
    /// 阶段提交完成后返回该阶段的第一个错误，不再执行后续阶段
    #[default]
    Propagate,
    /// 记录并忽略，只有 `LoadcuterError::Aborted` 会终止运行
    Absorb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub deadline: Duration,
    pub panic_policy: PanicPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            panic_policy: PanicPolicy::default(),
        }
    }
}

impl GraphConfig {
    pub fn with_deadline_ms(deadline_ms: u64) -> Self {
        Self {
            deadline: Duration::from_millis(deadline_ms),
            ..Default::default()
        }
    }

    pub fn panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub error_policy: StageErrorPolicy,
    pub panic_policy: PanicPolicy,
}

impl StageConfig {
    pub fn error_policy(mut self, policy: StageErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }
}
