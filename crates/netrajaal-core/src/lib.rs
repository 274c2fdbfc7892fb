/*! Mesh-relay protocol core: reliable unit sends, chunked transfer, inbound
 dispatch, neighbor/path discovery, and the scheduler (`Node`) tying them
 together, on top of the wire format defined by `netrajaal-link`.

 This crate is transport- and platform-agnostic: it is generic over a
 [`netrajaal_common::link::LinkRead`] + [`netrajaal_common::link::LinkWrite`]
 pair, a [`netrajaal_common::time::Clock`], and an
 [`netrajaal_common::rng::Rng`], so the same state machines drive both a real
 half-duplex UART and an in-memory simulated link.
*/
#![no_std]

mod chunked;
mod decimal;
mod discovery;
mod ellipsis;
mod message_log;
mod node;
mod reassembler;
mod receiver;
mod unit_sender;

pub use chunked::ChunkedSender;
pub use discovery::{build_advertisement, Discovery, PathUpdate};
pub use message_log::{
    AckMissing, LogRecord, MessageLog, MissingIndices, Payload, RecvRecord, SentRecord,
    UnackedLogFull, UnackedRecord, MAX_MISSING_INDICES,
};
pub use node::Node;
pub use reassembler::{
    AddChunkOutcome, AddChunkParseError, BeginParseError, EndOutcome, Reassembler,
    CHUNK_PAYLOAD_SIZE, MAX_RECOMPILED_PAYLOAD,
};
pub use receiver::{process_line, AckRequest, DropReason, ReceivedEvent, ACK_PAYLOAD_CAP};
pub use unit_sender::{SendOutcome, UnitSender};
