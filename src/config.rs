//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KIEW__*` 覆盖（双下划线表示嵌套，如 `KIEW__LLM__MODEL=gemini-2.5-flash`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::orchestrator::DEFAULT_MAX_TOOL_ROUNDS;
use crate::core::resolve::FUNCTION_RESULT_LIMIT;
use crate::history::DEFAULT_MAX_HISTORY_SIZE;
use crate::llm::gemini::DEFAULT_MODEL;

/// API Key 未在配置中给出时读取的环境变量
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub chat: ChatSection,
}

/// [app] 段：助手名、数据目录、控制台前端使用的会话 ID
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 群聊中被提及即视为点名（不区分大小写）
    pub bot_name: String,
    pub data_dir: PathBuf,
    pub conversation_id: i64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            bot_name: "Kiew".to_string(),
            data_dir: PathBuf::from("data"),
            conversation_id: 0,
        }
    }
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// 缺省为官方 generativelanguage 端点
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl LlmSection {
    /// 配置中的 api_key，缺省时回退到 GEMINI_API_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// 环境变量查找可替换
    pub fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env(API_KEY_ENV).filter(|k| !k.trim().is_empty()))
    }
}

/// [chat] 段：历史容量、函数调用轮数上限、结果截断长度、单次工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub max_history_size: usize,
    pub max_tool_rounds: usize,
    pub function_result_limit: usize,
    pub tool_timeout_secs: u64,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            function_result_limit: FUNCTION_RESULT_LIMIT,
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 KIEW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件不存在为错误）
/// 3. 最后叠加环境变量 KIEW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KIEW")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
