//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MCPA__*` 覆盖（双下划线表示嵌套，如 `MCPA__LLM__PROVIDER=mock`）。
//! API Key 未在配置中给出时回退到环境变量 `GOOGLE_API_KEY`。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：服务名、版本、监听地址、单请求总时限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_app_version")]
    pub version: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 单个 /chat 请求的总时限（秒），超时即取消并 kill 在途子进程
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_app_name() -> String {
    "MCP LLM Assistant API".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// [llm] 段：后端、模型层级、迭代上限与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    /// 限流时按顺序降级
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    /// 单次请求内最多模型迭代次数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 单次模型调用超时（秒）
    #[serde(default = "default_llm_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            primary_model: default_primary_model(),
            fallback_models: default_fallback_models(),
            max_iterations: default_max_iterations(),
            request_timeout_secs: default_llm_request_timeout_secs(),
        }
    }
}

impl LlmSection {
    /// 配置中的 key 优先，其次 GOOGLE_API_KEY；空串视为未配置
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// 主模型 + 降级链（去重，保持顺序）
    pub fn model_tiers(&self) -> Vec<String> {
        let mut tiers: Vec<String> = Vec::new();
        for m in std::iter::once(&self.primary_model).chain(self.fallback_models.iter()) {
            let m = m.trim();
            if !m.is_empty() && !tiers.iter().any(|t| t == m) {
                tiers.push(m.to_string());
            }
        }
        tiers
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_primary_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_fallback_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash-lite".into(),
        "gemini-2.0-flash".into(),
        "gemini-1.5-flash".into(),
    ]
}

fn default_max_iterations() -> usize {
    5
}

fn default_llm_request_timeout_secs() -> u64 {
    60
}

/// [tools] 段：docker 可执行文件、MCP 容器、超时与输出上限
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 存活探测 / 网关检查超时（秒）
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "default_log_tail")]
    pub default_log_tail: u32,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            docker_bin: default_docker_bin(),
            container_name: default_container_name(),
            max_output_chars: default_max_output_chars(),
            default_log_tail: default_log_tail(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_container_name() -> String {
    std::env::var("MCP_CONTAINER_NAME").unwrap_or_else(|_| "mcp-toolkit".to_string())
}

fn default_max_output_chars() -> usize {
    8000
}

fn default_log_tail() -> u32 {
    50
}

/// 从 config 目录加载配置，环境变量 MCPA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MCPA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MCPA")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("llm.fallback_models")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 检查配置问题（不阻止启动，由调用方记录日志）
pub fn verify_config(cfg: &AppConfig) -> Vec<String> {
    let mut issues = Vec::new();
    match cfg.llm.provider.as_str() {
        "gemini" => {
            if cfg.llm.resolved_api_key().is_none() {
                issues.push("GOOGLE_API_KEY is not set (llm.api_key)".to_string());
            }
        }
        "mock" => {}
        other => issues.push(format!("unknown llm.provider '{other}' (expected gemini or mock)")),
    }
    if cfg.llm.model_tiers().is_empty() {
        issues.push("no model configured (llm.primary_model / llm.fallback_models)".to_string());
    }
    if cfg.llm.max_iterations == 0 {
        issues.push("llm.max_iterations must be at least 1".to_string());
    }
    if cfg.llm.request_timeout_secs == 0 {
        issues.push("llm.request_timeout_secs must be at least 1".to_string());
    }
    if cfg.tools.tool_timeout_secs == 0 {
        issues.push("tools.tool_timeout_secs must be at least 1".to_string());
    }
    if cfg.tools.container_name.trim().is_empty() {
        issues.push("tools.container_name is empty".to_string());
    }
    issues
}
