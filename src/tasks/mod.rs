//! # Task abstractions and definitions.
//!
//! This module provides the task-related types:
//! - [`Task`] - trait for implementing async cancelable work
//! - [`TaskFn`] - function-based task implementation
//! - [`TaskRef`] - shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskSpec`] - definition bundling a task with its schedule and options
//! - [`RunOutcome`] - classified result of one run

mod outcome;
mod spec;
mod spec_builder;
mod task;
mod task_fn;

pub use outcome::RunOutcome;
pub(crate) use spec::ResolvedSpec;
pub use spec::{Every, Schedule, TaskSpec};
pub use spec_builder::TaskSpecBuilder;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
