// Notifier plugin implementations
pub mod telegram;

pub use telegram::TelegramNotifier;
