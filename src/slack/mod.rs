pub mod cache;
pub mod channel_sender;
pub mod client;
pub mod throttle;

pub use channel_sender::{AlertMessageTimestamps, Channel, ChannelSender};
