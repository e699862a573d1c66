//! Job, plan, and replicated-metadata value types shared by tracker components.
//!
//! Architecture role:
//! - value types replicated through the metadata store ([`JobMetadata`],
//!   [`MapReducePlan`], [`MetaTransform`])
//! - job descriptor and job-factory contracts
//! - task attempt descriptors exchanged with task executors
//!
//! Everything that crosses the store is a value: transforms produce new
//! snapshots, readers never observe partial mutation, and every replicated
//! type is serde-serialisable so the store can ship it between nodes.

pub mod job;
pub mod metadata;
pub mod plan;
pub mod task;
pub mod transform;

pub use job::{FailCause, FailKind, JobFactory, JobInfo, JobPhase, MapReduceJob};
pub use metadata::JobMetadata;
pub use plan::{InputSplit, MapReducePlan};
pub use task::{TaskInfo, TaskState, TaskStatus, TaskType};
pub use transform::MetaTransform;
