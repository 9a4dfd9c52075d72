mod auth_handler;
mod message_handler;
mod misc_handler;

pub use auth_handler::*;
pub use message_handler::*;
pub use misc_handler::*;
