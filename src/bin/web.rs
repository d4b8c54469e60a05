//! mcp-assistant HTTP 服务
//!
//! 启动: cargo run --bin mcp-assistant-web
//!
//! 环境变量:
//! - GOOGLE_API_KEY: Gemini API Key
//! - MCP_CONTAINER_NAME: MCP 网关容器名 (默认 "mcp-toolkit")
//! - MCPA__APP__PORT 等: 覆盖 config/default.toml 中的任意键

#[cfg(feature = "web")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use mcp_assistant::agent::create_agent_components;
    use mcp_assistant::config::{load_config, verify_config};
    use mcp_assistant::server::{create_router, AppState};

    mcp_assistant::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    for issue in verify_config(&cfg) {
        tracing::warn!(issue = %issue, "config issue");
    }

    let components = create_agent_components(&cfg).context("Failed to create agent components")?;
    let state = Arc::new(AppState::new(components, &cfg));
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.app.host, cfg.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("{} v{} listening on http://{}", cfg.app.name, cfg.app.version, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "web"))]
fn main() {
    eprintln!("请使用 --features web 编译: cargo run --bin mcp-assistant-web --features web");
    std::process::exit(1);
}
