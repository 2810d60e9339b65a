pub mod commands;
pub mod logging;
pub mod orchestrator;
pub mod report;

pub use logging::{init_logging, Logger};
pub use orchestrator::{Components, Orchestrator};
pub use report::{ItemFailure, RunReport, RunStatus, Stage};

pub mod prelude {
    pub use crate::orchestrator::{Components, Orchestrator};
    pub use crate::report::{RunReport, RunStatus, Stage};
    pub use ab_core::{Error, Result, RunConfig};
}
