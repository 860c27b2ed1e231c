pub mod config_gate;
pub mod event_scheduler;
pub mod foreman;
pub mod periodic;
pub mod pool;

pub use config_gate::{ConfigGate, ConfigSnapshot, GateReport};
pub use event_scheduler::{EventScheduler, ScheduledAction};
pub use foreman::{DispatchOutcome, Foreman, ForemanDeps};
pub use periodic::{PeriodicJob, PeriodicJobKind, PeriodicJobs};
pub use pool::{ReconcileReport, WorkerPool};
