//! Protocol module containing the opcode table, message types, and the binary codec.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_header, encode_header, verify_double_byte_order, ProtocolError, Record};
pub use messages::*;
pub use sequence::SequenceCounter;
