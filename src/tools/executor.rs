//! 工具执行器（命令执行适配器边界）
//!
//! 持有 ToolRegistry 与控制面探测；execute(tool_name, args, timeout, cancel) 依次做：
//! 查找工具 → 参数校验 → 存活探测（仅需要控制面的工具）→ 在超时内执行 → 清洗截断输出。
//! 探测自带超时，不占用工具自身的超时预算。
//! 任何失败都转为 success=false 的 ToolResult，不会向外抛出；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::ToolError;
use crate::tools::manifest::ToolManifest;
use crate::tools::probe::LivenessProbe;
use crate::tools::registry::{ToolContext, ToolRegistry};
use crate::tools::result::ToolResult;

/// 子进程 kill + 回收预留的余量；整次调用不超过 timeout + GRACE
const GRACE: Duration = Duration::from_millis(500);

pub struct ToolExecutor {
    registry: ToolRegistry,
    probe: Arc<dyn LivenessProbe>,
    max_output_chars: usize,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, probe: Arc<dyn LivenessProbe>, max_output_chars: usize) -> Self {
        Self {
            registry,
            probe,
            max_output_chars,
        }
    }

    pub fn manifest(&self) -> ToolManifest {
        self.registry.manifest()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn probe(&self) -> Arc<dyn LivenessProbe> {
        Arc::clone(&self.probe)
    }

    /// 执行指定工具；永远返回 ToolResult
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let start = Instant::now();
        let preview = args_preview(&args);

        let outcome = self.run(tool_name, args, limit, cancel).await;

        let (ok, kind) = match &outcome {
            Ok(_) => (true, serde_json::json!("ok")),
            Err(e) => (false, serde_json::json!(e.kind())),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": kind,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let result = match outcome {
            Ok(output) => ToolResult::ok(output),
            Err(e) => ToolResult::failure(&e),
        };
        result.sanitized(self.max_output_chars)
    }

    async fn run(
        &self,
        tool_name: &str,
        args: serde_json::Value,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        tool.validate(&args)?;

        if tool.requires_control_surface() {
            let liveness = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                liveness = self.probe.probe() => liveness,
            };
            if !liveness.available {
                return Err(ToolError::NotAvailable(
                    liveness.reason.unwrap_or_else(|| "probe failed".into()),
                ));
            }
        }

        let ctx = ToolContext {
            timeout: limit,
            cancel: cancel.clone(),
        };
        match timeout(limit + GRACE, tool.execute(args, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout { after: limit }),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
