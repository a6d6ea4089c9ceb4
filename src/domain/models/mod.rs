pub mod config;
pub mod mcp;
pub mod object;
pub mod run;
pub mod share;
pub mod thread;
pub mod workflow;
pub mod workspace;

pub use config::{
    Config, DispatcherConfig, LoggingConfig, RetentionConfig, StoreBackend, StoreConfig,
};
pub use mcp::{
    McpServer, McpServerInstance, McpServerInstanceSpec, McpServerManifest, McpServerSpec,
    ProjectMcpServer, ProjectMcpServerManifest, ProjectMcpServerSpec, MCP_SERVER_FINALIZER,
    MCP_SERVER_INSTANCE_FINALIZER, PROJECT_MCP_SERVER_FINALIZER,
};
pub use object::{fields, FieldSelector, Kind, Object, ObjectKey, ObjectMeta, RawObject, ResourceSpec};
pub use run::{
    ExecutionState, ExecutionStateSpec, ExternalCall, ExternalCallResult, Run, RunSpec, RunState,
    RunStatus,
};
pub use share::{ThreadShare, ThreadShareSpec};
pub use thread::{
    Thread, ThreadManifest, ThreadRole, ThreadSpec, ThreadStatus, DEPRECATED_THREAD_FINALIZERS,
    TEMPLATE_SNAPSHOT_ANNOTATION,
};
pub use workflow::{Tool, ToolManifest, ToolSpec, Workflow, WorkflowManifest, WorkflowSpec, WorkflowStep};
pub use workspace::{
    Agent, AgentSpec, AgentStatus, KnowledgeSet, KnowledgeSetSpec, KnowledgeSetStatus, Workspace,
    WorkspaceSpec, WorkspaceStatus, KNOWLEDGE_SET_FINALIZER, WORKSPACE_FINALIZER,
};
