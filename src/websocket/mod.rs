//! WebSocket protocol handling: upgrade admission, the per-connection frame
//! loop, and room broadcast.

mod handler;
mod message;
mod router;

pub use handler::{admit, ws_handler, WsQuery};
pub use message::{validate_content, ClientMessage, OutboundMessage, ProtocolError, ServerMessage};
pub use router::{BroadcastResult, MessageRouter};
