//! Task author contract: handlers, their outcomes, and the handler registry.

pub mod box_handler;
pub mod handler;
pub mod registry;

pub use box_handler::BoxTaskHandler;
pub use handler::{FnTaskHandler, TaskContext, TaskHandler, TaskOutcome, from_fn};
pub use registry::TaskHandlerRegistry;
