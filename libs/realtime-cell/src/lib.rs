pub mod handlers;
pub mod router;

pub use handlers::RealtimeState;
pub use router::create_realtime_router;
