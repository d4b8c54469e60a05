//! Docker 控制面与 MCP 工具
//!
//! - DockerControl：docker CLI 封装，实现 LivenessProbe（引擎探测）与网关状态检查
//! - execute_command：`docker mcp <command>`，访问 MCP 网关上的工具（Notion 等）
//! - list_containers：`docker ps -a`
//! - get_logs：`docker logs --tail N <container>`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ToolsSection;
use crate::core::ToolError;
use crate::tools::command::run_command;
use crate::tools::manifest::schema_for_args;
use crate::tools::probe::{Liveness, LivenessProbe};
use crate::tools::registry::{parse_args, Tool, ToolContext};

/// docker CLI 句柄：可执行文件、MCP 容器名、探测超时
#[derive(Debug, Clone)]
pub struct DockerControl {
    docker_bin: String,
    container_name: String,
    probe_timeout: Duration,
}

impl DockerControl {
    pub fn new(
        docker_bin: impl Into<String>,
        container_name: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            container_name: container_name.into(),
            probe_timeout,
        }
    }

    pub fn from_config(cfg: &ToolsSection) -> Self {
        Self::new(
            cfg.docker_bin.clone(),
            cfg.container_name.clone(),
            Duration::from_secs(cfg.probe_timeout_secs),
        )
    }

    pub fn docker_bin(&self) -> &str {
        &self.docker_bin
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// 运行 docker 子命令；非零退出转为 NonZeroExit
    async fn docker(&self, args: Vec<String>, ctx: &ToolContext) -> Result<String, ToolError> {
        run_command(&self.docker_bin, &args, ctx.timeout, &ctx.cancel)
            .await?
            .into_result()
    }

    /// MCP 网关状态：`docker mcp server list` 能在探测超时内成功返回即视为 running
    pub async fn gateway_running(&self) -> Result<(), String> {
        let args = vec!["mcp".to_string(), "server".to_string(), "list".to_string()];
        match run_command(&self.docker_bin, &args, self.probe_timeout, &CancellationToken::new()).await {
            Ok(out) => out.into_result().map(|_| ()).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl LivenessProbe for DockerControl {
    async fn probe(&self) -> Liveness {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        match run_command(&self.docker_bin, &args, self.probe_timeout, &CancellationToken::new()).await {
            Ok(out) if out.success() => Liveness::up(),
            Ok(out) => Liveness::down(format!(
                "docker engine unreachable: {}",
                out.stderr.trim()
            )),
            Err(e) => Liveness::down(e.to_string()),
        }
    }

    async fn status_detail(&self) -> String {
        match self.gateway_running().await {
            Ok(()) => "running".to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "mcp gateway check failed");
                "not_running".to_string()
            }
        }
    }
}

/// 按空白切分命令行，单/双引号内的空白保留（如 `tools call X '{"a": 1}'`）
pub fn split_command_line(line: &str) -> Result<Vec<String>, ToolError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(ToolError::InvalidArguments(format!("unterminated quote in: {line}")));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// 模型有时会把 `docker mcp` 前缀一并传入，去掉后切分为 `mcp ...` 参数
pub fn mcp_command_args(command: &str) -> Result<Vec<String>, ToolError> {
    let tokens = split_command_line(command)?;
    let skip = match tokens.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["docker", "mcp", ..] => 2,
        ["mcp", ..] => 1,
        _ => 0,
    };
    Ok(std::iter::once("mcp".to_string())
        .chain(tokens.into_iter().skip(skip))
        .collect())
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteCommandArgs {
    /// The MCP gateway command to run, without the `docker mcp` prefix (e.g. `tools call API-post-search`)
    pub command: String,
}

/// 通过 MCP 网关执行命令
pub struct ExecuteCommandTool {
    docker: Arc<DockerControl>,
}

impl ExecuteCommandTool {
    pub fn new(docker: Arc<DockerControl>) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Runs a command on the Docker MCP gateway (`docker mcp <command>`). Use it to list MCP servers, \
         list gateway tools, or call a tool, e.g. `server list`, `tools list`, \
         `tools call API-post-search`. Pass only the part after `docker mcp`."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<ExecuteCommandArgs>()
    }

    fn requires_control_surface(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        execute_command_argv(args.clone()).map(|_| ())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let argv = execute_command_argv(args)?;
        self.docker.docker(argv, ctx).await
    }
}

/// `docker mcp <command>` 的完整参数；命令为空时为 InvalidArguments
fn execute_command_argv(args: Value) -> Result<Vec<String>, ToolError> {
    let args: ExecuteCommandArgs = parse_args(args)?;
    let argv = mcp_command_args(&args.command)?;
    if argv.len() < 2 {
        return Err(ToolError::InvalidArguments("command must not be empty".into()));
    }
    Ok(argv)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListContainersArgs {}

/// 列出全部容器（含已停止）
pub struct ListContainersTool {
    docker: Arc<DockerControl>,
}

impl ListContainersTool {
    pub fn new(docker: Arc<DockerControl>) -> Self {
        Self { docker }
    }
}

/// `name\tstatus\timage\tid` 行转为 `name | status | image | id`
fn format_container_rows(raw: &str) -> String {
    let rows: Vec<String> = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            l.split('\t')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();
    if rows.is_empty() {
        "No containers found.".to_string()
    } else {
        format!("NAME | STATUS | IMAGE | ID\n{}", rows.join("\n"))
    }
}

#[async_trait]
impl Tool for ListContainersTool {
    fn name(&self) -> &str {
        "list_containers"
    }

    fn description(&self) -> &str {
        "Lists all Docker containers on the host (running and stopped) with name, status, image and id."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<ListContainersArgs>()
    }

    fn requires_control_surface(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        parse_args::<ListContainersArgs>(args.clone()).map(|_| ())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let _: ListContainersArgs = parse_args(args)?;
        let argv = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--format".to_string(),
            "{{.Names}}\t{{.Status}}\t{{.Image}}\t{{.ID}}".to_string(),
        ];
        let raw = self.docker.docker(argv, ctx).await?;
        Ok(format_container_rows(&raw))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetLogsArgs {
    /// Number of log lines to retrieve (default: 50)
    #[serde(default)]
    pub tail: Option<u32>,
}

/// 读取 MCP 容器最近日志
pub struct GetLogsTool {
    docker: Arc<DockerControl>,
    default_tail: u32,
}

impl GetLogsTool {
    pub fn new(docker: Arc<DockerControl>, default_tail: u32) -> Self {
        Self {
            docker,
            default_tail,
        }
    }

    fn tail(&self, args: Value) -> Result<u32, ToolError> {
        let args: GetLogsArgs = parse_args(args)?;
        let tail = args.tail.unwrap_or(self.default_tail);
        if tail == 0 {
            return Err(ToolError::InvalidArguments("tail must be at least 1".into()));
        }
        Ok(tail)
    }
}

#[async_trait]
impl Tool for GetLogsTool {
    fn name(&self) -> &str {
        "get_logs"
    }

    fn description(&self) -> &str {
        "Retrieves recent log output from the MCP container. Useful for debugging gateway or tool failures."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<GetLogsArgs>()
    }

    fn requires_control_surface(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        self.tail(args.clone()).map(|_| ())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let tail = self.tail(args)?;
        let argv = vec![
            "logs".to_string(),
            "--tail".to_string(),
            tail.to_string(),
            self.docker.container_name().to_string(),
        ];
        let out = run_command(self.docker.docker_bin(), &argv, ctx.timeout, &ctx.cancel).await?;
        // docker logs 会把容器的 stderr 原样写到 stderr，两者都是日志
        if out.success() {
            Ok(format!("{}{}", out.stdout, out.stderr))
        } else {
            out.into_result()
        }
    }
}
