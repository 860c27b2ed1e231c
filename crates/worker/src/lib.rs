pub mod executors;
pub mod handle;
pub mod idle;
pub mod runner;
pub mod state;

pub use executors::CommandExecutor;
pub use handle::WorkerHandle;
pub use idle::{IdlePermit, IdleWorkers};
pub use state::{Redundancy, WorkerShared};
