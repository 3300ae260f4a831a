//! 核心编排层：错误分类与恢复、会话注册表、结果截断、主控循环、组装

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod resolve;
pub mod sessions;

pub use builder::{Assistant, AssistantBuilder};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{Orchestrator, TurnLimits};
pub use recovery::RecoveryEngine;
pub use sessions::{SessionRegistry, SessionSlot};
