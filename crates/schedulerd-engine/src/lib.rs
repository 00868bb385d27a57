//! Recurrence Resolver, Dispatcher/Sender, immediate-run queue, and the
//! Poll Loop that ties them together.

pub mod immediate;
pub mod poll;
pub mod resolver;
pub mod sender;

pub use immediate::ImmediateQueue;
pub use poll::PollLoop;
pub use resolver::resolve_next_run;
pub use sender::{SendOutcome, Sender};
