//! mcp-assistant 无头 REPL
//!
//! 从 stdin 逐行读取提问，进程内保留历史；`/reset` 清空历史，`/quit` 退出。
//! 回答过程中 Ctrl-C 取消当前请求（在途子进程会被 kill）。

use anyhow::Context;
use mcp_assistant::agent::create_agent_components;
use mcp_assistant::config::{load_config, verify_config};
use mcp_assistant::core::{AgentError, LoopEvent};
use mcp_assistant::memory::ConversationTurn;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_assistant::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    for issue in verify_config(&cfg) {
        tracing::warn!(issue = %issue, "config issue");
    }
    let components = create_agent_components(&cfg).context("Failed to create agent")?;
    let orchestrator = components.orchestrator;

    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                println!("(history cleared)");
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(ev) = event_rx.recv().await {
                match ev {
                    LoopEvent::ToolCall { iteration, name } => println!("  [{iteration}] -> {name}"),
                    LoopEvent::ToolResult { name, success } => {
                        println!("  <- {name} ({})", if success { "ok" } else { "failed" })
                    }
                    LoopEvent::TierSwitch { from, to } => println!("  (rate limited on {from}, using {to})"),
                    LoopEvent::Final { .. } => {}
                }
            }
        });

        let result = {
            let respond = orchestrator.respond_with_events(line, history.clone(), &cancel, Some(&event_tx));
            tokio::pin!(respond);
            tokio::select! {
                r = &mut respond => r,
                _ = tokio::signal::ctrl_c() => {
                    // 等待编排器自行收尾，子进程在其中被 kill 并回收
                    cancel.cancel();
                    respond.await
                }
            }
        };
        drop(event_tx);
        let _ = printer.await;

        match result {
            Ok(reply) => {
                println!("{}\n", reply.text);
                history = reply.history;
            }
            Err(AgentError::Cancelled) => println!("(cancelled)\n"),
            Err(e) => println!("error: {e}\n"),
        }
    }

    Ok(())
}
