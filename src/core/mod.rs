//! Engine core: admission, execution, scheduling and lifecycle.
//!
//! The public API from this module is [`Manager`] (with [`ManagerBuilder`] and
//! [`ManagerConfig`]), [`TaskHandle`] and the snapshot types.
//!
//! Internal modules:
//! - [`gate`]: lifecycle phase behind a read/write lock, checked by every admission;
//! - [`runtime`]: per-task state machine (admit, finish, counters, waiters);
//! - [`runner`]: executes one run with hooks, timeout and panic isolation;
//! - [`scheduler`]: fixed-delay / fixed-rate loops for periodic tasks;
//! - [`signal`]: rotating completion signal the scheduler waits on;
//! - [`waiter`]: result mailboxes behind `trigger_and_wait`.

mod builder;
mod config;
mod gate;
mod handle;
mod manager;
mod runner;
mod runtime;
mod scheduler;
mod signal;
mod status;
mod waiter;

pub use builder::ManagerBuilder;
pub use config::ManagerConfig;
pub use gate::Phase;
pub use handle::{Admission, TaskHandle};
pub use manager::Manager;
pub use status::{TaskSnapshot, TaskState};
pub use waiter::RunWait;
