pub mod sender;

pub use sender::WebhookSender;
