//! 编排器集成测试：工具往返、未知工具、超时 kill、层级降级、迭代耗尽、取消

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use mcp_assistant::core::{
        AgentError, Orchestrator, OrchestratorSettings, Outcome, ToolError, EXHAUSTED_REPLY,
    };
    use mcp_assistant::llm::{MockModelClient, ModelClient, ModelResponse, ModelTiers};
    use mcp_assistant::memory::{ConversationTurn, Role, ToolCallRequest, TurnContent};
    use mcp_assistant::tools::{
        DockerControl, GetLogsTool, Liveness, LivenessProbe, Tool, ToolContext, ToolErrorKind,
        ToolExecutor, ToolRegistry,
    };
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    struct Up;

    #[async_trait]
    impl LivenessProbe for Up {
        async fn probe(&self) -> Liveness {
            Liveness::up()
        }
    }

    /// 固定返回值的工具，记录调用次数
    struct StaticTool {
        name: &'static str,
        output: Result<String, ToolError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "static test tool"
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    fn static_tool(name: &'static str, output: Result<String, ToolError>) -> (StaticTool, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            StaticTool {
                name,
                output,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn settings(max_iterations: usize, tool_timeout: Duration) -> OrchestratorSettings {
        OrchestratorSettings {
            max_iterations,
            tool_timeout,
            model_timeout: Duration::from_secs(5),
        }
    }

    fn build(
        tiers: Vec<Arc<MockModelClient>>,
        registry: ToolRegistry,
        probe: Arc<dyn LivenessProbe>,
        settings: OrchestratorSettings,
    ) -> Orchestrator {
        let clients: Vec<Arc<dyn ModelClient>> = tiers
            .into_iter()
            .map(|m| m as Arc<dyn ModelClient>)
            .collect();
        let executor = Arc::new(ToolExecutor::new(registry, probe, 8000));
        Orchestrator::new(ModelTiers::new(clients).unwrap(), executor, "test instruction", settings)
    }

    fn call(name: &str, args: Value) -> ModelResponse {
        ModelResponse::ToolCall(ToolCallRequest::new(name, args))
    }

    fn rate_limited() -> ModelResponse {
        ModelResponse::RateLimited {
            message: "429 RESOURCE_EXHAUSTED".into(),
        }
    }

    /// 写入一个假的 docker 可执行脚本：version / ps 立即返回，logs 记录 pid 后长时间挂起
    #[cfg(unix)]
    fn fake_docker(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let pid_file = dir.join("logs.pid");
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  version) echo 24.0.7 ;;\n  ps) printf 'web\\tUp 2 hours\\tnginx\\tabc\\n' ;;\n  logs) echo $$ > {}; exec sleep 30 ;;\n  *) exit 1 ;;\nesac\n",
            pid_file.display()
        );
        let bin = dir.join("fake-docker");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        (bin, pid_file)
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid_file: &std::path::Path) -> bool {
        let pid = std::fs::read_to_string(pid_file).unwrap();
        std::path::Path::new(&format!("/proc/{}", pid.trim())).exists()
    }

    #[tokio::test]
    async fn test_list_containers_round_trip() {
        let model = Arc::new(MockModelClient::new("gemini-2.5-flash").with_responses(vec![
            call("list_containers", json!({})),
            ModelResponse::FinalText("You have 2 containers: web, db.".into()),
        ]));
        let (tool, calls) = static_tool("list_containers", Ok("web, db".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![model.clone()], registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let reply = orch
            .respond("list containers", vec![], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.text, "You have 2 containers: web, db.");
        assert_eq!(reply.outcome, Outcome::Final);
        assert_eq!(reply.history.len(), 4);
        assert_eq!(reply.history[0], ConversationTurn::user("list containers"));
        assert!(matches!(reply.history[1].content, TurnContent::ToolCall(ref c) if c.name == "list_containers"));
        let result = reply.history[2].as_tool_result().unwrap();
        assert!(result.success);
        assert_eq!(result.output, "web, db");
        assert_eq!(reply.history[3].role, Role::Model);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // 模型第一次看到 user，第二次看到 user + 调用 + 结果
        assert_eq!(model.history_lengths(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_back_to_model() {
        let model = Arc::new(MockModelClient::new("a").with_responses(vec![
            call("delete_everything", json!({})),
            ModelResponse::FinalText("I can't do that.".into()),
        ]));
        let (tool, calls) = static_tool("list_containers", Ok("web".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![model], registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let reply = orch.respond("wipe it", vec![], &CancellationToken::new()).await.unwrap();

        let result = reply.history[2].as_tool_result().unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::UnknownTool));
        assert_eq!(reply.iterations, 2);
        assert_eq!(reply.text, "I can't do that.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_consumes_one_iteration() {
        let model = Arc::new(
            MockModelClient::new("a").with_responses(vec![call("delete_everything", json!({}))]),
        );
        let orch = build(vec![model], ToolRegistry::new(), Arc::new(Up), settings(1, Duration::from_secs(30)));

        let reply = orch.respond("wipe it", vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(reply.iterations, 1);
        assert!(reply.is_exhausted());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_get_logs_timeout_kills_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let (bin, pid_file) = fake_docker(dir.path());
        let docker = Arc::new(DockerControl::new(
            bin.to_string_lossy(),
            "mcp-toolkit",
            Duration::from_secs(5),
        ));
        let mut registry = ToolRegistry::new();
        registry.register(GetLogsTool::new(docker.clone(), 50));

        let model = Arc::new(MockModelClient::new("a").with_responses(vec![
            call("get_logs", json!({"tail": 5})),
            ModelResponse::FinalText("The log command timed out.".into()),
        ]));
        let orch = build(vec![model], registry, docker, settings(5, Duration::from_millis(500)));

        let start = Instant::now();
        let reply = orch.respond("show logs", vec![], &CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));

        let result = reply.history[2].as_tool_result().unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
        assert_eq!(result.output, "Error: Command timed out after 500 ms");
        assert!(!process_alive(&pid_file), "subprocess left running");
        assert_eq!(reply.text, "The log command timed out.");
    }

    #[tokio::test]
    async fn test_all_tiers_rate_limited() {
        let tiers: Vec<Arc<MockModelClient>> = ["A", "B", "C"]
            .into_iter()
            .map(|id| Arc::new(MockModelClient::new(id).with_responses(vec![rate_limited()])))
            .collect();
        let (tool, calls) = static_tool("list_containers", Ok("web".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(tiers.clone(), registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let err = orch
            .respond("list containers", vec![], &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AgentError::AllModelsRateLimited {
                tiers: vec!["A".into(), "B".into(), "C".into()]
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // 每层都只被调用一次，且看到的都只有初始 user 轮
        for tier in &tiers {
            assert_eq!(tier.history_lengths(), vec![1]);
        }
    }

    #[tokio::test]
    async fn test_fallback_reaches_third_tier() {
        let a = Arc::new(MockModelClient::new("A").with_responses(vec![rate_limited()]));
        let b = Arc::new(MockModelClient::new("B").with_responses(vec![rate_limited()]));
        let c = Arc::new(
            MockModelClient::new("C").with_responses(vec![ModelResponse::FinalText("from C".into())]),
        );
        let orch = build(
            vec![a.clone(), b.clone(), c.clone()],
            ToolRegistry::new(),
            Arc::new(Up),
            settings(5, Duration::from_secs(30)),
        );

        let reply = orch.respond("hi", vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(reply.text, "from C");
        assert_eq!(reply.model, "C");
        assert_eq!(reply.iterations, 1);
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
        assert_eq!(reply.history.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_tier_is_kept_for_rest_of_request() {
        let a = Arc::new(MockModelClient::new("A").with_responses(vec![rate_limited()]));
        let b = Arc::new(MockModelClient::new("B").with_responses(vec![
            call("list_containers", json!({})),
            ModelResponse::FinalText("done".into()),
        ]));
        let (tool, _) = static_tool("list_containers", Ok("web".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![a.clone(), b.clone()], registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let reply = orch.respond("hi", vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(reply.text, "done");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 2);
        // 限流重试不消耗迭代
        assert_eq!(reply.iterations, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_apology() {
        let responses = (0..5).map(|_| call("delete_everything", json!({}))).collect();
        let model = Arc::new(MockModelClient::new("a").with_responses(responses));
        let orch = build(vec![model.clone()], ToolRegistry::new(), Arc::new(Up), settings(5, Duration::from_secs(30)));

        let reply = orch.respond("do it", vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(reply.text, EXHAUSTED_REPLY);
        assert_eq!(reply.outcome, Outcome::Exhausted);
        assert_eq!(reply.iterations, 5);
        assert_eq!(model.calls(), 5);
        // user + 5 × (调用 + 结果) + 兜底回复
        assert_eq!(reply.history.len(), 12);
    }

    #[tokio::test]
    async fn test_history_grows_by_two_per_round_trip() {
        let model = Arc::new(MockModelClient::new("a").with_responses(vec![
            call("list_containers", json!({})),
            call("list_containers", json!({})),
            ModelResponse::FinalText("two looks".into()),
        ]));
        let (tool, _) = static_tool("list_containers", Ok("web".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![model.clone()], registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let prior = vec![ConversationTurn::user("hello"), ConversationTurn::model("hi there")];
        let reply = orch.respond("look twice", prior.clone(), &CancellationToken::new()).await.unwrap();

        assert_eq!(model.history_lengths(), vec![3, 5, 7]);
        assert_eq!(reply.history.len(), 8);
        assert_eq!(&reply.history[..2], &prior[..]);
    }

    #[tokio::test]
    async fn test_adapter_failure_becomes_tool_result() {
        let model = Arc::new(MockModelClient::new("a").with_responses(vec![
            call("execute_command", json!({"command": "tools call missing"})),
            ModelResponse::FinalText("The gateway reported an error.".into()),
        ]));
        let (tool, _) = static_tool(
            "execute_command",
            Err(ToolError::NonZeroExit {
                code: 1,
                output: "unknown tool: missing".into(),
            }),
        );
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![model], registry, Arc::new(Up), settings(5, Duration::from_secs(30)));

        let reply = orch.respond("call missing", vec![], &CancellationToken::new()).await.unwrap();
        let result = reply.history[2].as_tool_result().unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::NonZeroExit));
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.output, "Error: unknown tool: missing");
    }

    #[tokio::test]
    async fn test_invalid_arguments_surface_as_tool_result() {
        let model = Arc::new(MockModelClient::new("a").with_responses(vec![
            call("get_logs", json!({"tail": "many"})),
            ModelResponse::FinalText("bad args".into()),
        ]));
        let docker = Arc::new(DockerControl::new("docker", "mcp-toolkit", Duration::from_secs(1)));
        let mut registry = ToolRegistry::new();
        registry.register(GetLogsTool::new(docker, 50));
        let orch = build(vec![model], registry, Arc::new(Up), settings(5, Duration::from_secs(5)));

        let reply = orch.respond("logs", vec![], &CancellationToken::new()).await.unwrap();
        let result = reply.history[2].as_tool_result().unwrap();
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidArguments));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancellation_kills_in_flight_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let (bin, pid_file) = fake_docker(dir.path());
        let docker = Arc::new(DockerControl::new(
            bin.to_string_lossy(),
            "mcp-toolkit",
            Duration::from_secs(5),
        ));
        let mut registry = ToolRegistry::new();
        registry.register(GetLogsTool::new(docker.clone(), 50));
        let model = Arc::new(MockModelClient::new("a").with_responses(vec![call("get_logs", json!({}))]));
        let orch = build(vec![model], registry, docker, settings(5, Duration::from_secs(30)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let pid_probe = pid_file.clone();
        tokio::spawn(async move {
            // 等子进程真正启动后再取消
            for _ in 0..100 {
                if pid_probe.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            trigger.cancel();
        });

        let start = Instant::now();
        let err = orch.respond("show logs", vec![], &cancel).await.unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!process_alive(&pid_file), "subprocess orphaned after cancel");
    }

    #[tokio::test]
    async fn test_model_calls_bounded_by_iterations() {
        let responses = (0..20).map(|_| call("list_containers", json!({}))).collect();
        let model = Arc::new(MockModelClient::new("a").with_responses(responses));
        let (tool, calls) = static_tool("list_containers", Ok("web".into()));
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let orch = build(vec![model.clone()], registry, Arc::new(Up), settings(3, Duration::from_secs(30)));

        let reply = orch.respond("loop", vec![], &CancellationToken::new()).await.unwrap();
        assert!(reply.is_exhausted());
        assert_eq!(model.calls(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
