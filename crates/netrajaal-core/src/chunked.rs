//! Chunked transfer engine: fragments oversize payloads and drives the
//! Begin -> Chunks -> End handshake, with up to 50 repair rounds driven by
//! the receiver's reported missing-chunk list. Polled one cooperative tick
//! at a time, same as [`crate::unit_sender::UnitSender`], since a transfer
//! can take many ticks (each Begin/End round is itself a full reliable
//! unit send).

use heapless::Vec as HVec;
use netrajaal_common::link::LinkWrite;
use netrajaal_common::rng::Rng;
use netrajaal_common::{dev_debug, dev_warn};
use netrajaal_link::{Address, MsgType, NodeTimings, CHUNK_PAYLOAD_SIZE, FRAME_SIZE};

use crate::decimal::write_u16;
use crate::message_log::{AckMissing, MessageLog, MissingIndices};
use crate::unit_sender::{SendOutcome, UnitSender};

/// Outer repair-round budget.
const MAX_ROUNDS: u8 = 50;

const BEGIN_PAYLOAD_CAP: usize = 16;
const CHUNK_MSG_CAP: usize = 3 + 1 + 5 + 1 + CHUNK_PAYLOAD_SIZE;

enum Phase {
    SingleShot(UnitSender),
    SendingBegin(UnitSender),
    SendingChunk { index: u16, sender: UnitSender },
    SendingEnd { round: u8, sender: UnitSender },
    ResendingMissing { round: u8, missing: MissingIndices, cursor: usize, sender: UnitSender },
    Done(bool),
}

/// A chunked (or, for payloads under `FRAME_SIZE`, single-frame) send in
/// progress.
pub struct ChunkedSender<const MAX_PAYLOAD: usize> {
    my_addr: Address,
    dest: Address,
    inner_type: MsgType,
    tid: [u8; 3],
    payload: HVec<u8, MAX_PAYLOAD>,
    chunk_count: u16,
    phase: Phase,
}

impl<const MAX_PAYLOAD: usize> ChunkedSender<MAX_PAYLOAD> {
    pub fn new<R: Rng>(rng: &mut R, my_addr: Address, msg_type: MsgType, payload: &[u8], dest: Address) -> Self {
        let mut stored = HVec::new();
        let _ = stored.extend_from_slice(&payload[..payload.len().min(stored.capacity())]);

        if payload.len() < FRAME_SIZE {
            let sender = UnitSender::new(rng, my_addr, msg_type, payload, dest);
            return ChunkedSender {
                my_addr,
                dest,
                inner_type: msg_type,
                tid: [0; 3],
                payload: stored,
                chunk_count: 0,
                phase: Phase::SingleShot(sender),
            };
        }

        let tid = netrajaal_common::rng::rand_tag(rng);
        let chunk_count = ((payload.len() + CHUNK_PAYLOAD_SIZE - 1) / CHUNK_PAYLOAD_SIZE) as u16;
        dev_debug!("starting chunked transfer to {}: {} bytes in {} chunks", dest, payload.len(), chunk_count);
        let mut this = ChunkedSender {
            my_addr,
            dest,
            inner_type: msg_type,
            tid,
            payload: stored,
            chunk_count,
            phase: Phase::Done(false), // placeholder, replaced below
        };
        let begin_phase = this.make_begin_phase(rng);
        this.phase = begin_phase;
        this
    }

    fn chunk_bytes(&self, index: u16) -> &[u8] {
        let start = index as usize * CHUNK_PAYLOAD_SIZE;
        let end = (start + CHUNK_PAYLOAD_SIZE).min(self.payload.len());
        &self.payload[start..end]
    }

    fn make_begin_phase<R: Rng>(&self, rng: &mut R) -> Phase {
        let mut buf: HVec<u8, BEGIN_PAYLOAD_CAP> = HVec::new();
        let _ = buf.push(self.inner_type.to_byte());
        let _ = buf.push(b':');
        let _ = buf.extend_from_slice(&self.tid);
        let _ = buf.push(b':');
        let mut digits = [0u8; 5];
        let n = write_u16(self.chunk_count, &mut digits);
        let _ = buf.extend_from_slice(&digits[..n]);
        let sender = UnitSender::new(rng, self.my_addr, MsgType::Begin, &buf, self.dest);
        Phase::SendingBegin(sender)
    }

    fn make_chunk_phase<R: Rng>(&self, rng: &mut R, index: u16) -> Phase {
        let mut buf: HVec<u8, CHUNK_MSG_CAP> = HVec::new();
        let _ = buf.extend_from_slice(&self.tid);
        let _ = buf.push(b':');
        let mut digits = [0u8; 5];
        let n = write_u16(index, &mut digits);
        let _ = buf.extend_from_slice(&digits[..n]);
        let _ = buf.push(b':');
        let _ = buf.extend_from_slice(self.chunk_bytes(index));
        let sender = UnitSender::new(rng, self.my_addr, MsgType::IntermediateChunk, &buf, self.dest);
        Phase::SendingChunk { index, sender }
    }

    fn make_end_phase<R: Rng>(&self, rng: &mut R, round: u8) -> Phase {
        let sender = UnitSender::new(rng, self.my_addr, MsgType::End, &self.tid, self.dest);
        Phase::SendingEnd { round, sender }
    }

    /// Advances the transfer by one cooperative tick. Returns `Some(true)`
    /// once the transfer is confirmed complete (or was short enough to
    /// skip chunking and was acked), `Some(false)` on hard failure or
    /// budget exhaustion, `None` while still in progress.
    pub fn poll<
        Timings: NodeTimings,
        const SENT_CAP: usize,
        const UNACKED_CAP: usize,
        const RECV_CAP: usize,
        L: LinkWrite,
        R: Rng,
    >(
        &mut self,
        now_nanos: u64,
        link: &mut L,
        log: &mut MessageLog<SENT_CAP, UNACKED_CAP, RECV_CAP>,
        rng: &mut R,
    ) -> Option<bool> {
        loop {
            match &mut self.phase {
                Phase::Done(ok) => return Some(*ok),
                Phase::SingleShot(sender) => match sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now_nanos, link, log) {
                    None => return None,
                    Some(outcome) => {
                        self.phase = Phase::Done(outcome.is_success());
                        continue;
                    }
                },
                Phase::SendingBegin(sender) => match sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now_nanos, link, log) {
                    None => return None,
                    Some(outcome) => {
                        if !outcome.is_success() {
                            self.phase = Phase::Done(false);
                            continue;
                        }
                        self.phase = self.make_chunk_phase(rng, 0);
                        continue;
                    }
                },
                Phase::SendingChunk { index, sender } => {
                    let index = *index;
                    match sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now_nanos, link, log) {
                        None => return None,
                        Some(_best_effort_outcome) => {
                            let next = index + 1;
                            self.phase = if next >= self.chunk_count {
                                self.make_end_phase(rng, 0)
                            } else {
                                self.make_chunk_phase(rng, next)
                            };
                            continue;
                        }
                    }
                }
                Phase::SendingEnd { round, sender } => {
                    let round = *round;
                    match sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now_nanos, link, log) {
                        None => return None,
                        Some(outcome) => {
                            let missing = match outcome {
                                SendOutcome::Failed => {
                                    self.phase = Phase::Done(false);
                                    continue;
                                }
                                SendOutcome::Acked { missing } => missing,
                            };
                            match missing {
                                AckMissing::Complete | AckMissing::NotApplicable => {
                                    self.phase = Phase::Done(true);
                                    continue;
                                }
                                AckMissing::Missing(list) if list.is_empty() => {
                                    self.phase = Phase::Done(true);
                                    continue;
                                }
                                AckMissing::Missing(list) => {
                                    if round + 1 >= MAX_ROUNDS {
                                        dev_warn!("transfer to {} gave up after {} repair rounds", self.dest, MAX_ROUNDS);
                                        self.phase = Phase::Done(false);
                                        continue;
                                    }
                                    let first = list[0];
                                    let resend = self.make_chunk_phase(rng, first);
                                    let sender = match resend {
                                        Phase::SendingChunk { sender, .. } => sender,
                                        _ => unreachable!(),
                                    };
                                    self.phase = Phase::ResendingMissing { round, missing: list, cursor: 0, sender };
                                    continue;
                                }
                            }
                        }
                    }
                }
                Phase::ResendingMissing { round, missing, cursor, sender } => {
                    let (round, cursor) = (*round, *cursor);
                    match sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now_nanos, link, log) {
                        None => return None,
                        Some(_best_effort_outcome) => {
                            let next_cursor = cursor + 1;
                            if next_cursor >= missing.len() {
                                self.phase = self.make_end_phase(rng, round + 1);
                            } else {
                                let idx = missing[next_cursor];
                                let missing = missing.clone();
                                let resend = self.make_chunk_phase(rng, idx);
                                let sender = match resend {
                                    Phase::SendingChunk { sender, .. } => sender,
                                    _ => unreachable!(),
                                };
                                self.phase = Phase::ResendingMissing { round, missing, cursor: next_cursor, sender };
                            }
                            continue;
                        }
                    }
                }
            }
        }
    }
}
