//! Aggregated readiness of a thread.

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Thread, ThreadSpec};

/// Whether everything the thread depends on has been provisioned.
/// Reads status only.
pub fn is_ready(thread: &Thread) -> bool {
    let status = &thread.status;

    if status.workspace_id.is_none() {
        return false;
    }
    if thread.is_project_based() && status.shared_workspace_name.is_none() {
        return false;
    }
    if thread.copies_from_source() {
        if !thread.spec.manifest.shared_tasks.is_empty() && !status.copied_tasks {
            return false;
        }
        if !status.copied_tools {
            return false;
        }
    }
    if thread.spec.agent_name.is_some()
        && (status.shared_knowledge_set_name.is_none() || status.knowledge_set_names.is_empty())
    {
        return false;
    }
    true
}

/// Flips `status.created` to true once [`is_ready`] holds. Never clears it.
pub struct SetCreated;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for SetCreated {
    fn name(&self) -> &'static str {
        "SetCreated"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if thread.status.created || !is_ready(thread) {
            return Ok(Outcome::Converged);
        }

        thread.status.created = true;
        client.update_status(thread).await?;
        tracing::info!(thread = %thread.name(), namespace = %thread.namespace(), "thread created");
        Ok(Outcome::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ThreadManifest;

    fn provisioned(spec: ThreadSpec) -> Thread {
        let mut thread = Thread::new("default", "t1a", spec);
        thread.status.workspace_name = Some("wksp1-a".to_string());
        thread.status.workspace_id = Some("id-a".to_string());
        thread
    }

    #[test]
    fn test_plain_thread_needs_only_workspace() {
        let mut thread = provisioned(ThreadSpec::default());
        assert!(is_ready(&thread));

        thread.status.workspace_id = None;
        assert!(!is_ready(&thread));
    }

    #[test]
    fn test_project_needs_shared_workspace() {
        let mut thread = provisioned(ThreadSpec { project: true, ..Default::default() });
        assert!(!is_ready(&thread));

        thread.status.shared_workspace_name = Some("wksp1-shared".to_string());
        assert!(is_ready(&thread));
    }

    #[test]
    fn test_copy_flags_gate_copied_projects() {
        let mut thread = provisioned(ThreadSpec {
            project: true,
            source_thread_name: Some("t1src".to_string()),
            manifest: ThreadManifest {
                shared_tasks: vec!["w1a".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });
        thread.status.shared_workspace_name = Some("wksp1-shared".to_string());

        thread.status.copied_tools = true;
        assert!(!is_ready(&thread));

        thread.status.copied_tasks = true;
        assert!(is_ready(&thread));

        // Without shared tasks the task flag is not required.
        thread.spec.manifest.shared_tasks.clear();
        thread.status.copied_tasks = false;
        assert!(is_ready(&thread));
    }

    #[test]
    fn test_agent_thread_needs_knowledge_sets() {
        let mut thread = provisioned(ThreadSpec {
            agent_name: Some("agentA".to_string()),
            ..Default::default()
        });
        thread.status.shared_knowledge_set_name = Some("kst1-a".to_string());
        assert!(!is_ready(&thread));

        thread.status.knowledge_set_names = vec!["kst1-a".to_string()];
        assert!(is_ready(&thread));
    }
}
