//! 助手构建器：按配置组装持久化网关、存储、历史缓冲、工具与编排器
//!
//! 后端可由调用方注入（测试用脚本化后端）；未注入时按 [llm] 段创建 Gemini 后端，缺少 API Key 为致命错误。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, API_KEY_ENV};
use crate::core::orchestrator::TurnLimits;
use crate::core::{AgentError, Orchestrator};
use crate::gateway::Dispatcher;
use crate::history::HistoryBuffer;
use crate::llm::{ChatBackend, GeminiBackend, GeminiSettings, ToolDeclaration};
use crate::storage::{BlobStore, JsonFileStore, SaveQueue};
use crate::store::ChatStore;
use crate::tools::{ChatDataTool, RollDiceTool, ToolExecutor, ToolRegistry};

/// 组装完成的运行时
pub struct Assistant {
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: Dispatcher,
    pub store: Arc<ChatStore>,
    pub history: Arc<HistoryBuffer>,
    pub queue: SaveQueue,
}

impl Assistant {
    /// 等待所有已投递的快照写盘
    pub async fn shutdown(&self) {
        if let Err(e) = self.queue.flush().await {
            tracing::warn!(error = %e, "flush on shutdown failed");
        }
    }
}

/// 环境变量查找函数
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub struct AssistantBuilder {
    config: AppConfig,
    gateway: Option<Arc<dyn BlobStore>>,
    backend: Option<Arc<dyn ChatBackend>>,
    env: EnvLookup,
}

impl AssistantBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            gateway: None,
            backend: None,
            env: process_env,
        }
    }

    /// 替换持久化网关（默认为 data_dir 下的 JSON 文件）
    pub fn with_gateway(mut self, gateway: Arc<dyn BlobStore>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 替换 API Key 的环境变量来源（默认读进程环境）
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// 需在 tokio runtime 内调用（保存队列会启动后台任务）
    pub async fn build(self) -> Result<Assistant, AgentError> {
        let chat = &self.config.chat;
        let gateway = match self.gateway {
            Some(g) => g,
            None => {
                let root: PathBuf = self.config.app.data_dir.clone();
                tracing::info!(data_dir = %root.display(), "using file storage");
                Arc::new(JsonFileStore::new(root))
            }
        };
        let queue = SaveQueue::spawn(gateway.clone());

        let store = Arc::new(ChatStore::new(gateway.clone(), queue.clone()));
        let history = Arc::new(
            HistoryBuffer::load(gateway.as_ref(), chat.max_history_size, queue.clone()).await?,
        );

        let mut registry = ToolRegistry::new();
        registry.register(ChatDataTool::new(store.clone()));
        registry.register(RollDiceTool);
        let executor = ToolExecutor::new(registry, chat.tool_timeout_secs);
        tracing::info!(tools = ?executor.tool_names(), "tools registered");

        let backend = match self.backend {
            Some(b) => b,
            None => Arc::new(gemini_backend(&self.config, self.env, executor.declarations())?),
        };

        let limits = TurnLimits {
            max_tool_rounds: chat.max_tool_rounds,
            function_result_limit: chat.function_result_limit,
        };
        let orchestrator = Arc::new(Orchestrator::new(backend, history.clone(), executor, limits));
        let dispatcher = Dispatcher::new(orchestrator.clone(), self.config.app.bot_name.clone());

        Ok(Assistant {
            orchestrator,
            dispatcher,
            store,
            history,
            queue,
        })
    }
}

fn gemini_backend(
    config: &AppConfig,
    env: EnvLookup,
    tools: Vec<ToolDeclaration>,
) -> Result<GeminiBackend, AgentError> {
    let api_key = config.llm.resolve_api_key_with(env).ok_or_else(|| {
        AgentError::Config(format!("no API key: set llm.api_key, KIEW__LLM__API_KEY or {API_KEY_ENV}"))
    })?;
    let settings = GeminiSettings {
        api_key,
        model: config.llm.model.clone(),
        base_url: config.llm.base_url.clone(),
        request_timeout_secs: config.llm.request_timeout_secs,
        system_prompt: config.llm.system_prompt.clone(),
    };
    GeminiBackend::new(settings, tools).map_err(|e| AgentError::Config(e.to_string()))
}
