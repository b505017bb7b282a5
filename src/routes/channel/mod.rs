mod handler;
mod model;

pub use handler::{create_channel, get_channel, list_channels, list_messages, post_message};
