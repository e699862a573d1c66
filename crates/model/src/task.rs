//! Task attempt descriptors exchanged with task executors.

use fmr_common::{JobId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::FailCause;
use crate::plan::InputSplit;

/// The kinds of task the tracker schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Map one input split.
    Map,
    /// Per-node pre-aggregation over all of the node's map output.
    Combine,
    /// Reduce one partition index.
    Reduce,
    /// Commit job output; submitted exactly once, by the update leader.
    Commit,
    /// Abort job output; submitted exactly once, by the update leader.
    Abort,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Map => "map",
            TaskType::Combine => "combine",
            TaskType::Reduce => "reduce",
            TaskType::Commit => "commit",
            TaskType::Abort => "abort",
        };
        f.write_str(s)
    }
}

/// Execution state reported back by a task executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Attempt is still executing. Never valid in a completion callback.
    Running,
    /// Attempt finished successfully.
    Completed,
    /// Attempt failed inside user/task code.
    Failed,
    /// Attempt process crashed.
    Crashed,
}

impl TaskState {
    /// Whether the state reports an unsuccessful completion.
    pub fn is_failure(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Crashed)
    }
}

/// One schedulable task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Node the attempt runs on.
    pub node: NodeId,
    /// Task kind.
    pub task_type: TaskType,
    /// Job the attempt belongs to.
    pub job_id: JobId,
    /// Deterministic attempt label from the plan numbering functions; the
    /// reducer index for reduce tasks.
    pub task_number: usize,
    /// Input split for map tasks.
    pub input_split: Option<InputSplit>,
}

impl TaskInfo {
    /// Map attempt for one split.
    pub fn map(node: NodeId, job_id: JobId, task_number: usize, split: InputSplit) -> Self {
        Self {
            node,
            task_type: TaskType::Map,
            job_id,
            task_number,
            input_split: Some(split),
        }
    }

    /// Reduce attempt for one partition index.
    pub fn reduce(node: NodeId, job_id: JobId, reducer: usize) -> Self {
        Self {
            node,
            task_type: TaskType::Reduce,
            job_id,
            task_number: reducer,
            input_split: None,
        }
    }

    /// Combine attempt covering all of the node's map output.
    pub fn combine(node: NodeId, job_id: JobId, task_number: usize) -> Self {
        Self {
            node,
            task_type: TaskType::Combine,
            job_id,
            task_number,
            input_split: None,
        }
    }

    /// Terminal commit attempt.
    pub fn commit(node: NodeId, job_id: JobId) -> Self {
        Self {
            node,
            task_type: TaskType::Commit,
            job_id,
            task_number: 0,
            input_split: None,
        }
    }

    /// Terminal abort attempt.
    pub fn abort(node: NodeId, job_id: JobId) -> Self {
        Self {
            node,
            task_type: TaskType::Abort,
            job_id,
            task_number: 0,
            input_split: None,
        }
    }
}

/// Completion report for a task attempt.
///
/// Constructors enforce that failed and crashed reports always carry a
/// cause, so downstream transforms never have to invent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    state: TaskState,
    fail_cause: Option<FailCause>,
}

impl TaskStatus {
    /// Successful completion.
    pub fn completed() -> Self {
        Self {
            state: TaskState::Completed,
            fail_cause: None,
        }
    }

    /// Failure inside task code.
    pub fn failed(cause: FailCause) -> Self {
        Self {
            state: TaskState::Failed,
            fail_cause: Some(cause),
        }
    }

    /// Task process crash.
    pub fn crashed(cause: FailCause) -> Self {
        Self {
            state: TaskState::Crashed,
            fail_cause: Some(cause),
        }
    }

    /// Reported execution state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Failure cause; present exactly when [`TaskState::is_failure`].
    pub fn fail_cause(&self) -> Option<&FailCause> {
        self.fail_cause.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reports_always_carry_a_cause() {
        let status = TaskStatus::failed(FailCause::task("oom"));
        assert!(status.state().is_failure());
        assert!(status.fail_cause().is_some());
        assert!(TaskStatus::completed().fail_cause().is_none());
    }

    #[test]
    fn reduce_task_number_is_the_reducer_index() {
        let node = NodeId::new("node-a");
        let task = TaskInfo::reduce(node.clone(), JobId::new(node, 1), 3);
        assert_eq!(task.task_number, 3);
        assert_eq!(task.task_type, TaskType::Reduce);
    }
}
