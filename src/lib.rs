mod constants;

// Modules
pub mod audit;
pub mod data;
pub mod errors;
pub mod expressivity;
pub mod learner;
pub mod optim;
pub mod regression;
pub mod report;
pub mod runner;
pub mod solver;
pub mod utils;

// Individual classes, and functions
pub use audit::{Auditor, FailurePolicy};
pub use data::{Dataset, Matrix};
pub use errors::AuditError;
pub use expressivity::{CachedExpressivity, ExpressivityFactory, ExpressivityProvider, ExpressivityTable, Split};
pub use report::{AuditReport, ReportRow};
pub use runner::{run_system, RunConfig, Strategy};
pub use solver::{
    AlphaWindow, Direction, GameConfig, GameSolver, GradientConfig, GradientSolver, JsonIO, SubgroupSearch,
};
