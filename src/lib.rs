pub mod artifact;
pub mod bus;
pub mod config;
pub mod error;
pub mod log;
pub mod plan;

// Core data model and the orchestration engine
pub mod core;
pub mod orchestration;

pub use crate::core::task::{DependencyKind, Outcome, Task, TaskId, TaskRecord, TaskStatus};
pub use crate::core::team::{TeamDescriptor, TeamId, TeamStatus};
pub use config::Config;
pub use error::{Error, Result};
