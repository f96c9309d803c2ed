pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Chat, Get, Init, Listen, SendMessage, Version};
