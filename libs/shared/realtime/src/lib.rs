pub mod broadcaster;
pub mod protocol;
pub mod registry;

pub use broadcaster::{Broadcaster, Published};
pub use protocol::{ChatClientEvent, ServerEvent, SpecialtyClientEvent, VideoClientEvent};
pub use registry::{ConnectionRegistry, SessionInfo};
