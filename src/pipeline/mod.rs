//! Stage orchestration: sample discovery, per-sample jobs, resume markers and the stage driver.

pub mod paths;
pub mod stage;
pub mod job;
pub mod context;
pub mod marker;
pub mod exec;
pub mod runner;
pub mod discovery;
pub mod driver;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{Config, RunContext, Manifest};
pub use stage::{Stage, Tools};
pub use paths::Layout;
