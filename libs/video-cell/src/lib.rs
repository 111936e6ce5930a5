pub mod handlers;
pub mod router;
pub mod services;

pub use handlers::VideoState;
pub use router::create_video_router;
pub use services::room::VideoRoomService;
pub use services::signaling::SignalingRelay;
