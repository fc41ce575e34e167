/// Wire protocol - RESP framing over TCP
///
/// Used by:
/// - The command listener (client requests, leader-side log streaming)
/// - Followers talking to their leader (handshake, resync, streaming)
/// - The append-only log (records are stored as multi-bulk commands)
pub mod connection;
pub mod resp;

pub use connection::{RespConnection, StreamedRecord};
pub use resp::{
    Frame, ProtocolError, ProtocolResult, RespReader, RespValue, encode_command, parse_frame,
};
