pub mod database;
pub mod extractor;
pub mod recorder;
pub mod runner;
pub mod scheduler;
pub mod session;


pub use database::{SqliteWatchStore, WatchStore};
pub use extractor::StatusExtractor;
pub use recorder::{ChangeRecorder, Transition};
pub use runner::{ContinuousRunner, RunnerState};
pub use scheduler::{SweepScheduler, SweepSummary};
pub use session::{SessionManager, SessionProvider};
