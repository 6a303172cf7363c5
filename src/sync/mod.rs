mod condition;

pub use condition::{Condition, WaitResult};
