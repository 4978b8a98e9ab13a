pub mod chrome;
pub mod manager;

pub use chrome::ChromePage;
pub use manager::{SessionHandle, SessionManager};
