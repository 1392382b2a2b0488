pub mod event;
pub mod health;
pub mod messages;
pub mod session;

pub use event::*;
pub use health::*;
pub use messages::*;
pub use session::*;
