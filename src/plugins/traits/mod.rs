pub mod notifier;
pub mod source;

pub use notifier::{NotificationResult, NotifierPlugin};
pub use source::SourcePlugin;

#[cfg(test)]
pub use notifier::MockNotifierPlugin;
#[cfg(test)]
pub use source::MockSourcePlugin;
