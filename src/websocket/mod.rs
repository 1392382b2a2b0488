pub mod handler;
pub mod msg_handler;
