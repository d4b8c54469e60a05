//! 子进程执行
//!
//! 直接 exec 目标程序（不经 shell），捕获 stdout / stderr，施加墙钟超时。
//! 子进程自成一个进程组（unix）；超时或取消时 SIGKILL 整组并回收子进程，
//! 返回前子进程及其派生的进程都已不存在。future 在执行中被丢弃时同样 kill 整组。

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};

use crate::core::ToolError;

/// 子进程正常结束后的输出（退出码可能非零）
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// 被信号终止时为 None
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// 非零退出转为 NonZeroExit：优先 stderr，其次 stdout，都为空时描述退出码
    pub fn into_result(self) -> Result<String, ToolError> {
        if self.success() {
            return Ok(self.stdout);
        }
        let code = self.code.unwrap_or(-1);
        let output = if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            format!("Command failed with exit code {code}")
        };
        Err(ToolError::NonZeroExit { code, output })
    }
}

/// 渲染完整调用（审计日志用）
pub fn render_invocation(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("'{a}'")
            } else {
                a.clone()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 运行 program args，limit 内未结束则 kill；cancel 触发时同样 kill 并返回 Cancelled。
/// 无法启动（如程序不存在）视为控制面不可用。
pub async fn run_command(
    program: &str,
    args: &[String],
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, ToolError> {
    let invocation = render_invocation(program, args);
    tracing::info!(invocation = %invocation, timeout_ms = limit.as_millis() as u64, "exec");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::NotAvailable(format!("failed to start {program}: {e}")))?;
    let group = ProcessGroup::new(child.id());

    let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = tokio::time::sleep(limit) => {
            terminate(&mut child, &group, &invocation, "timeout").await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Timeout { after: limit });
        }
        _ = cancel.cancelled() => {
            terminate(&mut child, &group, &invocation, "cancelled").await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Cancelled);
        }
    };

    // 直接子进程已退出；残留的后台进程会一直占住管道，随组一并结束
    group.kill();
    let status = status.map_err(|e| ToolError::NotAvailable(format!("wait failed: {e}")))?;
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

/// 以子进程 pid 为组号的进程组，drop 时 SIGKILL 整组
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::error!(pgid, error = %e, "failed to kill process group"),
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// 先 kill 整个进程组，再 kill 并等待回收直接子进程
async fn terminate(child: &mut Child, group: &ProcessGroup, invocation: &str, reason: &str) {
    let pid = child.id();
    group.kill();
    match child.kill().await {
        Ok(()) => tracing::warn!(?pid, invocation = %invocation, reason, "subprocess killed"),
        Err(e) => tracing::error!(?pid, invocation = %invocation, error = %e, "failed to kill subprocess"),
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "pipe read interrupted");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
