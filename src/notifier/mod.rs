// Notifier module: Telegram cycle summaries, alerts and chat commands.

pub mod telegram;

pub use telegram::TelegramNotifier;
