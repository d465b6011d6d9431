//! # supervisor-tree
//!
//! `supervisor-tree` runs Tokio tasks as supervised, restartable processes and
//! decides what happens when they finish, fail, panic, get cancelled or refuse
//! to stop, through small declarative policies.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use supervisor_tree::{
//!     backoff, close, limit, spawn, task_fn, BackoffPolicy, Context, ProcessOptions, Supervisor,
//!     TaskError,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let supervisor = Supervisor::new();
//!     let root = spawn(&Context::background(), supervisor.clone(), ProcessOptions::new());
//!
//!     let worker = task_fn(|ctx: Context| async move {
//!         while ctx.sleep(Duration::from_secs(1)).await {
//!             println!("working");
//!         }
//!         Ok::<(), TaskError>(())
//!     });
//!
//!     supervisor
//!         .start(
//!             &root.context(),
//!             worker,
//!             ProcessOptions::new().on_error([limit(10), backoff(BackoffPolicy::default())]),
//!         )
//!         .await;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     root.cancel();
//!     root.done().await;
//! }
//! ```
//!
//! ## What you get
//!
//! * **Processes and incarnations** – every restart is a fresh incarnation of the
//!   same process, with its own start/exit timestamps and error.
//! * **Responder chains** – per outcome kind (success, error, cancel, panic,
//!   linger), an ordered list of policies where the first decisive one wins.
//! * **Grace periods** – a cancelled task that does not return in time is
//!   reported as lingering instead of blocking shutdown forever.
//! * **Supervision trees** – a [`Supervisor`] is itself a task, and [`cascade`]
//!   escalates a failure to the parent supervisor's process.
//!
//! ## Policies
//!
//! | Response                 | Action                                                          |
//! | ------------------------ | --------------------------------------------------------------- |
//! | `close()`                | Stop the process, keeping the outcome as its terminal error     |
//! | `restart()`              | Run another incarnation right away                              |
//! | `cascade()`              | Stop and cancel the parent supervisor's process                 |
//! | `when(cond, responses)`  | Consult `responses` only when `cond` holds                      |
//! | `backoff(policy)`        | Wait an exponentially growing interval, then restart            |
//! | `limit(n)`               | Close after `n` restarts, pass otherwise                        |
//!
//! Enable the `with_tracing` feature to get lifecycle logs through `tracing`.

pub use context::{Clock, Context, TokioClock};
pub use error::{ConfigError, ProcessError};
pub use process::{spawn, Incarnation, Process, ProcessId, ProcessOptions, DEFAULT_GRACE};
pub use response::{
    backoff, cascade, close, limit, responder_fn, restart, when, Action, BackoffPolicy,
    ExponentialBackoff, Responder, ResponderFn, Responders, Response,
};
pub use supervisor::{
    builder::{SupervisorBuilder, DEFAULT_START_CAPACITY},
    Supervisor,
};
pub use task::{task_fn, SupervisedTask, TaskError, TaskFn, TaskResult};

mod context;
mod error;
mod log;
mod process;
mod response;
mod supervisor;
mod task;
