//! Kiew - 带工具调用的对话助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量 KIEW__*）
//! - **core**: 编排循环、错误分类与恢复、会话注册表、组装
//! - **gateway**: 入站消息与分发（点名判断、每消息一个任务）
//! - **history**: 未点名消息的有界缓冲
//! - **llm**: 后端抽象、Gemini 实现与脚本化 Mock
//! - **storage**: 持久化网关（JSON 文件 / 内存）与后台保存队列
//! - **store**: 每会话结构化数据（标量与物品清单）
//! - **tools**: 工具注册表、执行器与内置工具（chat_data、roll_dice）

pub mod config;
pub mod core;
pub mod gateway;
pub mod history;
pub mod llm;
pub mod observability;
pub mod storage;
pub mod store;
pub mod tools;
