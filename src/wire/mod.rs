pub mod bitfield;
pub mod handshake;
pub mod message;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::{Message, MessageId};
