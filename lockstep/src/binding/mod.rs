//! Point-to-point data exchange between tasks.
//!
//! Instead of one aggregate master context written by every task, each
//! (producer field, consumer field) pair gets its own [`UniBinding`] with a
//! private buffer. The scheduler drives a [`BindingContext`] through the same
//! two bubble phases it uses for a plain context.

mod context;
pub use context::{BindingContext, UniBinding};

mod copy;
pub use copy::InPlaceCopy;

mod port;
pub use port::Port;

mod task;
pub use task::{BindingTask, TaskBody};
