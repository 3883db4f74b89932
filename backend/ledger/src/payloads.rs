//! # Payloads
//!
//! Protobuf bodies sent by the frontend when casting a vote.
//!
//! ```proto
//! message VotePayload {
//!     string caption_id = 1;
//!     sint32 vote_value = 2;
//! }
//! ```
use prost::{DecodeError, Message, bytes::Buf};

#[derive(Clone, PartialEq, Message)]
pub struct VotePayload {
    #[prost(string, tag = "1")]
    pub caption_id: String,
    #[prost(sint32, tag = "2")]
    pub vote_value: i32,
}

pub fn get_vote_from_bytes<B: Buf>(buf: B) -> Result<VotePayload, DecodeError> {
    VotePayload::decode(buf)
}
