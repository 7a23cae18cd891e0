pub mod notifier;

pub use notifier::{NotificationResult, NotifierPlugin, OpenAlert};
