//! Headless 运行时组装
//!
//! 由配置构建模型层级、docker 控制面、工具注册表与编排器；
//! 全部通过构造参数注入，HTTP 服务与 REPL 共用同一套组件。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, OrchestratorSettings};
use crate::llm::{GeminiClient, MockModelClient, ModelClient, ModelTiers};
use crate::tools::{
    DockerControl, ExecuteCommandTool, GetLogsTool, ListContainersTool, LivenessProbe,
    ToolExecutor, ToolRegistry,
};

/// 系统提示：说明可用工具与 MCP 网关命令的用法
pub const SYSTEM_INSTRUCTION: &str = r#"You are an operations assistant with direct access to a Docker host and a Docker MCP gateway.

Tools:
- execute_command: run a gateway command. Pass only what follows `docker mcp`, e.g. `server list`, `tools list`, `tools call <TOOL> '<JSON arguments>'`.
- list_containers: list every container with its status and image.
- get_logs: read recent log lines of the MCP gateway container.

Workspace (Notion) operations go through the gateway:
- search everything: tools call API-post-search
- query a database: tools call API-post-database-query '{"database_id":"<ID>"}'
- read a page: tools call API-retrieve-a-page '{"page_id":"<ID>"}'
- read a database schema: tools call API-retrieve-a-database '{"database_id":"<ID>"}'
- create a page: tools call API-post-page '{"parent":{"database_id":"<ID>"},"properties":{...}}'

Use the tools instead of asking the user for identifiers: search first, then act, then confirm what you did.
When a tool reports an error, explain it briefly and try a different approach if one exists."#;

/// 预构建组件：编排器与控制面探测，可多请求共享
pub struct AgentComponents {
    pub orchestrator: Arc<Orchestrator>,
    pub probe: Arc<dyn LivenessProbe>,
    /// 模型后端是否具备可用凭据（mock 恒为 true）
    pub llm_configured: bool,
}

/// 按 [llm] 段构建层级：gemini 为每个模型一个客户端，mock 为同名 Mock 客户端
pub fn build_model_tiers(cfg: &AppConfig) -> Result<ModelTiers, AgentError> {
    let names = cfg.llm.model_tiers();
    let clients: Vec<Arc<dyn ModelClient>> = match cfg.llm.provider.as_str() {
        "mock" => names
            .iter()
            .map(|n| Arc::new(MockModelClient::new(n.clone())) as Arc<dyn ModelClient>)
            .collect(),
        "gemini" => {
            let api_key = cfg.llm.resolved_api_key().unwrap_or_default();
            let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
            names
                .iter()
                .map(|n| {
                    GeminiClient::new(cfg.llm.base_url.as_deref(), n, &api_key, timeout)
                        .map(|c| Arc::new(c) as Arc<dyn ModelClient>)
                        .map_err(|e| AgentError::ConfigError(e.to_string()))
                })
                .collect::<Result<_, _>>()?
        }
        other => {
            return Err(AgentError::ConfigError(format!(
                "unknown llm.provider '{other}'"
            )))
        }
    };
    ModelTiers::new(clients)
}

/// docker 工具集：execute_command / list_containers / get_logs
pub fn build_tool_registry(docker: &Arc<DockerControl>, cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(ExecuteCommandTool::new(Arc::clone(docker)));
    tools.register(ListContainersTool::new(Arc::clone(docker)));
    tools.register(GetLogsTool::new(Arc::clone(docker), cfg.tools.default_log_tail));
    tools
}

pub fn orchestrator_settings(cfg: &AppConfig) -> OrchestratorSettings {
    OrchestratorSettings {
        max_iterations: cfg.llm.max_iterations,
        tool_timeout: Duration::from_secs(cfg.tools.tool_timeout_secs),
        model_timeout: Duration::from_secs(cfg.llm.request_timeout_secs),
    }
}

/// 创建全部组件
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let tiers = build_model_tiers(cfg)?;
    let docker = Arc::new(DockerControl::from_config(&cfg.tools));
    let probe: Arc<dyn LivenessProbe> = docker.clone();
    let registry = build_tool_registry(&docker, cfg);
    let executor = Arc::new(ToolExecutor::new(
        registry,
        Arc::clone(&probe),
        cfg.tools.max_output_chars,
    ));

    tracing::info!(
        provider = %cfg.llm.provider,
        tiers = ?tiers.ids(),
        tools = ?executor.tool_names(),
        "agent components ready"
    );

    let llm_configured = cfg.llm.provider == "mock" || cfg.llm.resolved_api_key().is_some();
    let orchestrator = Orchestrator::new(
        tiers,
        executor,
        SYSTEM_INSTRUCTION,
        orchestrator_settings(cfg),
    );

    Ok(AgentComponents {
        orchestrator: Arc::new(orchestrator),
        probe,
        llm_configured,
    })
}
