pub mod manager;
pub mod notifiers;
pub mod traits;

pub use manager::{DispatchOutcome, NotificationDispatcher};
pub use traits::{NotifierPlugin, OpenAlert};
