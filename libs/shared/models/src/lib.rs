pub mod auth;
pub mod chat;
pub mod consultation;
pub mod error;
pub mod queue;
pub mod video;
