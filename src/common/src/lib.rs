pub mod error;
pub mod priority;
pub mod process;
pub mod snapshot;
pub mod status;
