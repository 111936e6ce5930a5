pub mod handlers;
pub mod router;
pub mod services;

pub use handlers::ChatState;
pub use router::create_chat_router;
pub use services::chat::ChatService;
