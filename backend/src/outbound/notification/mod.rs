//! Outbound delivery of flake notifications.

mod webhook_notifier;

pub use webhook_notifier::WebhookFlakeNotifier;
