pub mod command;
pub mod docker;
pub mod executor;
pub mod manifest;
pub mod probe;
pub mod registry;
pub mod result;

pub use command::{run_command, CommandOutput};
pub use docker::{DockerControl, ExecuteCommandTool, GetLogsTool, ListContainersTool};
pub use executor::ToolExecutor;
pub use manifest::{schema_for_args, ToolManifest, ToolSpec};
pub use probe::{Liveness, LivenessProbe};
pub use registry::{parse_args, Tool, ToolContext, ToolRegistry};
pub use result::{sanitize_output, ToolErrorKind, ToolResult, EMPTY_OUTPUT};
