pub mod manager;
pub mod notifiers;
pub mod sources;
pub mod traits;

pub use manager::PluginManager;
pub use traits::{NotificationResult, NotifierPlugin, SourcePlugin};
