//! Inbound frame processing: parse, filter, dispatch by type, and
//! decide whether a reply ack is owed.

use heapless::Vec as HVec;
use netrajaal_common::rng::Rng;
use netrajaal_link::{self as link, Address, FrameDecodeError, Mid, MsgType};

use crate::discovery::{Discovery, PathUpdate};
use crate::message_log::MessageLog;
use crate::reassembler::{
    truncate_missing_for_frame, AddChunkOutcome, EndOutcome, Reassembler, MAX_RECOMPILED_PAYLOAD,
};

/// Upper bound on an ack frame's payload: the acked MID plus `:` plus a
/// truncated missing-index list.
pub const ACK_PAYLOAD_CAP: usize = 220;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ParseError(FrameDecodeError),
    SimulatedLoss,
    WrongDestination,
}

#[derive(Debug, Clone)]
pub enum ReceivedEvent {
    Dropped(DropReason),
    Heartbeat { source: Address },
    TransferBegun { source: Address, tid: [u8; 3] },
    ChunkStored { source: Address, tid: [u8; 3] },
    ChunkDroppedUnknownTransfer { source: Address },
    TransferComplete { source: Address, tid: [u8; 3], inner_type: MsgType, payload: HVec<u8, MAX_RECOMPILED_PAYLOAD> },
    TransferIncomplete { source: Address, tid: [u8; 3] },
    NeighborSeen { source: Address },
    PathUpdated { source: Address },
    PathRejected { source: Address },
    AckObserved,
    Event { source: Address },
}

/// An ack the caller should send out (via a fire-and-forget
/// [`crate::unit_sender::UnitSender`] of type [`MsgType::Ack`]).
pub struct AckRequest {
    pub dest: Address,
    pub payload: HVec<u8, ACK_PAYLOAD_CAP>,
}

/// Processes one inbound line (already stripped of its trailing `\n` by the
/// link). `flakiness_percent` and `rng` implement the simulated-loss test
/// knob; production callers pass `flakiness_percent = 0`, in which case
/// `rng` is never consulted.
pub fn process_line<
    const SENT_CAP: usize,
    const UNACKED_CAP: usize,
    const RECV_CAP: usize,
    const MAX_TRANSFERS: usize,
    const MAX_CHUNKS_PER_TRANSFER: usize,
    const MAX_NEIGHBORS: usize,
    const MAX_PATH: usize,
    R: Rng,
>(
    my_addr: Address,
    line: &[u8],
    now_nanos: u64,
    flakiness_percent: u8,
    rng: &mut R,
    log: &mut MessageLog<SENT_CAP, UNACKED_CAP, RECV_CAP>,
    reassembler: &mut Reassembler<MAX_TRANSFERS, MAX_CHUNKS_PER_TRANSFER>,
    discovery: &mut Discovery<MAX_NEIGHBORS, MAX_PATH>,
) -> (ReceivedEvent, Option<AckRequest>) {
    let parsed = match link::parse(line) {
        Ok(p) => p,
        Err(e) => return (ReceivedEvent::Dropped(DropReason::ParseError(e)), None),
    };

    if flakiness_percent > 0 {
        let roll = 1 + (rng.next_u32() % 100) as u8;
        if roll <= flakiness_percent {
            return (ReceivedEvent::Dropped(DropReason::SimulatedLoss), None);
        }
    }

    if !parsed.mid.dest.is_broadcast() && parsed.mid.dest != my_addr {
        return (ReceivedEvent::Dropped(DropReason::WrongDestination), None);
    }

    let mid = parsed.mid;
    let payload = parsed.payload;
    log.record_recv(mid, payload, now_nanos);

    let event = match mid.msg_type {
        MsgType::Heartbeat => ReceivedEvent::Heartbeat { source: mid.source },
        MsgType::Begin => {
            let _ = reassembler.begin(mid.source, payload);
            ReceivedEvent::TransferBegun { source: mid.source, tid: tid_from_begin_payload(payload) }
        }
        MsgType::IntermediateChunk => match reassembler.add(mid.source, payload) {
            Ok(AddChunkOutcome::Stored) => {
                ReceivedEvent::ChunkStored { source: mid.source, tid: tid_from_leading_field(payload) }
            }
            Ok(AddChunkOutcome::UnknownTransfer) | Ok(AddChunkOutcome::ChunkTableFull) | Err(_) => {
                ReceivedEvent::ChunkDroppedUnknownTransfer { source: mid.source }
            }
        },
        MsgType::End => {
            let tid = tid_from_leading_field(payload);
            match reassembler.end(mid.source, tid) {
                EndOutcome::Complete(recompiled) => {
                    let inner_type = reassembler.inner_type(mid.source, tid).unwrap_or(MsgType::Event);
                    ReceivedEvent::TransferComplete { source: mid.source, tid, inner_type, payload: recompiled }
                }
                EndOutcome::Incomplete(_) => ReceivedEvent::TransferIncomplete { source: mid.source, tid },
            }
        }
        MsgType::NeighborScan => {
            discovery.on_scan(mid.source);
            ReceivedEvent::NeighborSeen { source: mid.source }
        }
        MsgType::ShortestPath => match discovery.on_path(my_addr, payload) {
            PathUpdate::Updated => ReceivedEvent::PathUpdated { source: mid.source },
            PathUpdate::Ignored => ReceivedEvent::PathRejected { source: mid.source },
        },
        MsgType::Ack => ReceivedEvent::AckObserved,
        MsgType::Event => ReceivedEvent::Event { source: mid.source },
    };

    let ack = if mid.ack_expected() { Some(build_ack(mid, &event, reassembler)) } else { None };
    (event, ack)
}

/// `IntermediateChunk`'s and `End`'s payloads both start with the 3-letter
/// transfer ID, optionally followed by `:` and more fields (`End`'s payload
/// is the bare tid with nothing after it).
fn tid_from_leading_field(payload: &[u8]) -> [u8; 3] {
    let field = match payload.iter().position(|&b| b == b':') {
        Some(pos) => &payload[..pos],
        None => payload,
    };
    let mut tid = [0u8; 3];
    let n = field.len().min(3);
    tid[..n].copy_from_slice(&field[..n]);
    tid
}

/// Begin's payload is `{inner_type}:{tid}:{count}`; the tid is the second
/// colon-separated field.
fn tid_from_begin_payload(payload: &[u8]) -> [u8; 3] {
    let mut tid = [0u8; 3];
    let Some(first_colon) = payload.iter().position(|&b| b == b':') else {
        return tid;
    };
    let rest = &payload[first_colon + 1..];
    let field = match rest.iter().position(|&b| b == b':') {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    let n = field.len().min(3);
    tid[..n].copy_from_slice(&field[..n]);
    tid
}

fn build_ack<const MAX_TRANSFERS: usize, const MAX_CHUNKS_PER_TRANSFER: usize>(
    acked_mid: Mid,
    event: &ReceivedEvent,
    reassembler: &Reassembler<MAX_TRANSFERS, MAX_CHUNKS_PER_TRANSFER>,
) -> AckRequest {
    let mut payload: HVec<u8, ACK_PAYLOAD_CAP> = HVec::new();
    let _ = payload.extend_from_slice(&acked_mid.to_bytes());
    match event {
        ReceivedEvent::TransferComplete { .. } => {
            let _ = payload.extend_from_slice(b":-1");
        }
        ReceivedEvent::TransferIncomplete { source, tid } => {
            let missing = reassembler.missing(*source, *tid);
            let budget = ACK_PAYLOAD_CAP.min(link::FRAME_SIZE);
            let overhead_for_colon_and_mid = link::MIDLEN + 1;
            let truncated = truncate_missing_for_frame(&missing, budget.max(overhead_for_colon_and_mid));
            let _ = payload.push(b':');
            for (i, idx) in truncated.iter().enumerate() {
                if i > 0 {
                    let _ = payload.push(b',');
                }
                let mut digits = [0u8; 5];
                let n = crate::decimal::write_u16(*idx, &mut digits);
                let _ = payload.extend_from_slice(&digits[..n]);
            }
        }
        _ => {}
    }
    AckRequest { dest: acked_mid.source, payload }
}
