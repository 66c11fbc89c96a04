pub mod artifacts;
pub mod invocation;
pub mod progress;
pub mod registry;
pub mod supervisor;
pub mod workspace;
