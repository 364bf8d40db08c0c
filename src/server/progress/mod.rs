pub mod bus;
pub mod sse;

pub use bus::{JobHandle, JobRegistry};
