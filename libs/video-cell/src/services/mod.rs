pub mod room;
pub mod signaling;
