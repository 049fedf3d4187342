pub mod session;
pub mod socket;

pub use session::{PeerSession, PeerSessionError};
pub use socket::{PeerSocket, PeerSocketError};
