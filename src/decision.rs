//! Decision engine: turns a [`RoutingDecision`] plus a snapshot of current
//! orchestrator load into an [`ExecutionDecision`] verdict.
//!
//! The cascade is evaluated in a fixed priority order — reject, then
//! approval, then context-gathering, then decomposition, then queueing,
//! falling through to immediate execution. Each check is independent of the
//! others; the first one that matches wins.

use crate::domain::{Category, ExecutionDecision, Priority, RoutingDecision, SystemSnapshot, Task, TaskKind};

/// Queue depth above which the engine starts deferring non-critical work.
pub const MAX_QUEUE_SIZE: usize = 20;

/// Complexity at or above which a task is treated as approval-worthy.
pub const APPROVAL_COMPLEXITY_THRESHOLD: u8 = 4;

/// Resource utilization (active / max_concurrent) above which the system is
/// considered busy.
pub const RESOURCE_USAGE_THRESHOLD: f64 = 0.8;

/// Confidence below which a routing decision is too ambiguous to act on.
const REJECT_CONFIDENCE_THRESHOLD: f64 = 0.3;

fn determine_context_requirements(routing: &RoutingDecision, description: &str) -> Vec<String> {
    let text = description.to_lowercase();
    let mut requirements = Vec::new();

    if routing.category == Category::FileOperations {
        if text.contains("current directory") {
            requirements.push("working_directory".to_string());
        }
        if text.contains("recent files") {
            requirements.push("recent_file_list".to_string());
        }
    }

    if routing.category == Category::CodeGeneration
        && ["this project", "current code", "existing"]
            .iter()
            .any(|r| text.contains(r))
    {
        requirements.push("project_structure".to_string());
        requirements.push("recent_code_changes".to_string());
    }

    if routing.category == Category::DataAnalysis && text.contains("previous analysis") {
        requirements.push("analysis_history".to_string());
    }

    requirements
}

fn should_decompose(routing: &RoutingDecision, snapshot: &SystemSnapshot) -> bool {
    if routing.strategy == crate::domain::Strategy::MultiStep {
        return true;
    }
    if routing.complexity >= APPROVAL_COMPLEXITY_THRESHOLD {
        return true;
    }
    let system_busy = snapshot.resource_usage > RESOURCE_USAGE_THRESHOLD;
    routing.estimated_duration_secs > 600 && system_busy
}

fn decompose_task(task: &Task, routing: &RoutingDecision) -> Vec<Task> {
    if routing.category == Category::Hybrid {
        return vec![
            Task::new(
                TaskKind::LlmQuery,
                task.priority,
                format!("Analyze requirements for: {}", task.description),
            ),
            Task::new(
                TaskKind::FileOperation,
                task.priority,
                format!("Execute file operations for: {}", task.description),
            ),
        ];
    }

    if routing.complexity >= APPROVAL_COMPLEXITY_THRESHOLD {
        return vec![
            Task::new(
                TaskKind::Analysis,
                Priority::High,
                format!("Prepare for: {}", task.description),
            ),
            Task::new(
                task.kind.clone(),
                task.priority,
                format!("Execute: {}", task.description),
            ),
        ];
    }

    Vec::new()
}

/// Evaluate the cascade and return a verdict for `task`, given its already
/// computed `routing` decision and the current `snapshot` of orchestrator
/// load.
pub fn decide(task: &Task, routing: &RoutingDecision, snapshot: &SystemSnapshot) -> ExecutionDecision {
    if routing.confidence < REJECT_CONFIDENCE_THRESHOLD {
        return ExecutionDecision::Reject {
            reason: "Task description too ambiguous".to_string(),
        };
    }

    if routing.requires_approval {
        return ExecutionDecision::RequestApproval {
            approval_id: format!("approval_{}", task.id),
            reason: format!(
                "High complexity ({}/5) or potentially destructive operation",
                routing.complexity
            ),
        };
    }

    if routing.requires_context {
        let needed = determine_context_requirements(routing, &task.description);
        if !needed.is_empty() {
            return ExecutionDecision::GatherContext {
                context_id: format!("context_{}", task.id),
                needed,
            };
        }
    }

    if should_decompose(routing, snapshot) {
        let subtasks = decompose_task(task, routing);
        if !subtasks.is_empty() {
            return ExecutionDecision::Decompose { subtasks };
        }
    }

    let system_busy = snapshot.resource_usage > RESOURCE_USAGE_THRESHOLD;
    if system_busy && routing.complexity >= 3 {
        return ExecutionDecision::Queue {
            position: snapshot.queue_depth,
        };
    }

    ExecutionDecision::ExecuteNow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Strategy, TaskStatus};

    fn routing(confidence: f64, complexity: u8, strategy: Strategy, category: Category) -> RoutingDecision {
        RoutingDecision {
            category,
            strategy,
            confidence,
            complexity,
            estimated_duration_secs: 60,
            suggested_tools: vec![],
            requires_approval: false,
            requires_context: false,
            reasoning: "test".to_string(),
        }
    }

    fn task() -> Task {
        Task::new(TaskKind::LlmQuery, Priority::Medium, "do a thing")
    }

    #[test]
    fn low_confidence_rejects() {
        let t = task();
        let r = routing(0.1, 2, Strategy::LocalLlmOnly, Category::General);
        let snapshot = SystemSnapshot::default();
        assert!(matches!(decide(&t, &r, &snapshot), ExecutionDecision::Reject { .. }));
    }

    #[test]
    fn approval_flag_requests_approval() {
        let t = task();
        let mut r = routing(0.9, 4, Strategy::LocalLlmOnly, Category::General);
        r.requires_approval = true;
        let snapshot = SystemSnapshot::default();
        let decision = decide(&t, &r, &snapshot);
        assert!(matches!(decision, ExecutionDecision::RequestApproval { .. }));
    }

    #[test]
    fn context_flag_with_matching_phrase_gathers_context() {
        let mut t = task();
        t.description = "list files in the current directory".to_string();
        let mut r = routing(0.9, 2, Strategy::LocalLlmOnly, Category::FileOperations);
        r.requires_context = true;
        let snapshot = SystemSnapshot::default();
        let decision = decide(&t, &r, &snapshot);
        match decision {
            ExecutionDecision::GatherContext { needed, .. } => {
                assert!(needed.contains(&"working_directory".to_string()));
            }
            other => panic!("expected GatherContext, got {other:?}"),
        }
    }

    #[test]
    fn multi_step_strategy_decomposes() {
        let t = task();
        let r = routing(0.9, 2, Strategy::MultiStep, Category::Hybrid);
        let snapshot = SystemSnapshot::default();
        let decision = decide(&t, &r, &snapshot);
        match decision {
            ExecutionDecision::Decompose { subtasks } => assert_eq!(subtasks.len(), 2),
            other => panic!("expected Decompose, got {other:?}"),
        }
    }

    #[test]
    fn busy_system_with_moderate_complexity_queues() {
        let t = task();
        let r = routing(0.9, 3, Strategy::LocalLlmOnly, Category::General);
        let snapshot = SystemSnapshot {
            resource_usage: 0.95,
            queue_depth: 4,
            ..Default::default()
        };
        assert!(matches!(decide(&t, &r, &snapshot), ExecutionDecision::Queue { position: 4 }));
    }

    #[test]
    fn idle_system_executes_immediately() {
        let t = task();
        let r = routing(0.9, 2, Strategy::LocalLlmOnly, Category::General);
        let snapshot = SystemSnapshot::default();
        assert_eq!(decide(&t, &r, &snapshot), ExecutionDecision::ExecuteNow);
    }

    #[test]
    fn task_status_defaults_to_pending() {
        assert_eq!(task().status, TaskStatus::Pending);
    }
}
