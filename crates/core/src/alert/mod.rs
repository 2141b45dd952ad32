pub mod message;
pub mod runner;
pub mod select;
pub mod system;

pub use system::{AlertOptions, AlertSystem, Status};
