pub mod intent;
pub mod message;
pub mod response;
pub mod session;
