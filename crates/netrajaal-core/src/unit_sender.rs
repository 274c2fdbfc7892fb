//! Reliable unit sender: sends one frame, and if an ack is required,
//! retries with progressive backoff, polled one cooperative tick at a time
//! so the rest of the scheduler keeps running while a send is in flight.

use heapless::Vec as HVec;
use netrajaal_common::link::{LinkWrite, LinkWriteError};
use netrajaal_common::rng::{rand_tag, Rng};
use netrajaal_common::{dev_debug, dev_trace, dev_warn};
use netrajaal_link::{encode, Address, Mid, MsgType, NodeTimings, MAX_ENCODED_FRAME_LEN};

use crate::message_log::{AckMissing, MessageLog};

/// Outer retry budget: attempts 0 through 4.
const MAX_RETRIES: u8 = 5;
/// Ack probes attempted per retry: probes 0 through 2.
const PROBES_PER_RETRY: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Acked { missing: AckMissing },
    Failed,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Acked { .. })
    }
}

enum SendState {
    /// Fire-and-forget: written once already, nothing left to do.
    FireAndForgetDone,
    /// About to (re-)write the frame for retry attempt `retry`.
    Writing(u8),
    /// Waiting for `deadline_nanos` before checking for an ack (probe
    /// number `probe` of this `retry`).
    AwaitingProbe { retry: u8, probe: u8, deadline_nanos: u64 },
    Done(SendOutcome),
}

/// A single reliable (or fire-and-forget) send in progress. Call [`poll`]
/// once per scheduler tick until it returns `Some(outcome)`.
pub struct UnitSender {
    mid: Mid,
    frame: HVec<u8, MAX_ENCODED_FRAME_LEN>,
    ack_needed: bool,
    first_sent_at_nanos: u64,
    state: SendState,
}

impl UnitSender {
    /// Builds the frame for `(msg_type, payload, dest)` from `my_addr`,
    /// tagging it with a fresh random MID.
    pub fn new<R: Rng>(
        rng: &mut R,
        my_addr: Address,
        msg_type: MsgType,
        payload: &[u8],
        dest: Address,
    ) -> Self {
        let tag = rand_tag(rng);
        let mid = Mid::new(msg_type, my_addr, dest, tag);
        let mut frame = HVec::new();
        frame.resize_default(frame.capacity()).ok();
        let len = encode(mid, payload, &mut frame).expect("payload must fit MAX_ENCODED_FRAME_LEN");
        frame.truncate(len);

        let ack_needed = mid.ack_expected();
        UnitSender {
            mid,
            frame,
            ack_needed,
            first_sent_at_nanos: 0,
            state: SendState::Writing(0),
        }
    }

    pub fn mid(&self) -> Mid {
        self.mid
    }

    /// Advances the send by one cooperative tick. `now_nanos` is the
    /// current monotonic time; `write` attempts to push the frame out over
    /// the link; `unacked_full` records the frame as in-flight the first
    /// time it is sent (no-op for fire-and-forget sends); `ack_lookup`
    /// checks the message log for a matching ack.
    pub fn poll<Timings: NodeTimings, const SENT_CAP: usize, const UNACKED_CAP: usize, const RECV_CAP: usize, L: LinkWrite>(
        &mut self,
        now_nanos: u64,
        link: &mut L,
        log: &mut MessageLog<SENT_CAP, UNACKED_CAP, RECV_CAP>,
    ) -> Option<SendOutcome> {
        loop {
            match &self.state {
                SendState::FireAndForgetDone => return Some(SendOutcome::Acked { missing: AckMissing::NotApplicable }),
                SendState::Done(outcome) => return Some(outcome.clone()),
                SendState::Writing(retry) => {
                    let retry = *retry;
                    if retry >= MAX_RETRIES {
                        dev_warn!("{:?} to {} exhausted all {} retries unacked", self.mid.msg_type, self.mid.dest, MAX_RETRIES);
                        self.state = SendState::Done(SendOutcome::Failed);
                        continue;
                    }
                    match link.write_line(&self.frame) {
                        Ok(()) => {
                            dev_trace!("[SENT] {} : {}", self.mid, crate::ellipsis::ellipsize(&self.frame));
                            if retry > 0 {
                                dev_debug!("retrying {:?} to {} (attempt {})", self.mid.msg_type, self.mid.dest, retry);
                            }
                            if retry == 0 {
                                self.first_sent_at_nanos = now_nanos;
                                if self.ack_needed {
                                    let _ = log.record_unacked(self.mid, &self.frame, now_nanos);
                                } else {
                                    log.record_sent(self.mid, &self.frame, now_nanos);
                                    self.state = SendState::FireAndForgetDone;
                                    continue;
                                }
                            }
                            if !self.ack_needed {
                                self.state = SendState::FireAndForgetDone;
                                continue;
                            }
                            self.state = SendState::AwaitingProbe {
                                retry,
                                probe: 0,
                                deadline_nanos: now_nanos + Timings::ACK_SLEEP.as_nanos() as u64,
                            };
                            return None;
                        }
                        Err(LinkWriteError::WouldBlock) => return None,
                    }
                }
                SendState::AwaitingProbe { retry, probe, deadline_nanos } => {
                    let (retry, probe, deadline_nanos) = (*retry, *probe, *deadline_nanos);
                    if now_nanos < deadline_nanos {
                        return None;
                    }
                    if let Some((_ack_ts, missing)) = log.ack_time(self.mid) {
                        log.promote_to_sent(self.mid);
                        self.state = SendState::Done(SendOutcome::Acked { missing: missing.clone() });
                        return Some(SendOutcome::Acked { missing });
                    }
                    if probe + 1 >= PROBES_PER_RETRY {
                        self.state = SendState::Writing(retry + 1);
                        continue;
                    }
                    let backoff = (Timings::ACK_SLEEP.as_nanos() as u64).saturating_mul((probe + 1) as u64);
                    self.state = SendState::AwaitingProbe {
                        retry,
                        probe: probe + 1,
                        deadline_nanos: now_nanos + backoff,
                    };
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;
    use netrajaal_link::DefaultNodeTimings;

    struct RecordingLink {
        writes: Vec<Vec<u8>>,
        block_next: bool,
    }

    impl LinkWrite for RecordingLink {
        fn write_line(&mut self, buf: &[u8]) -> Result<(), LinkWriteError> {
            if self.block_next {
                self.block_next = false;
                return Err(LinkWriteError::WouldBlock);
            }
            self.writes.push(buf.to_vec());
            Ok(())
        }
        fn is_tx_busy(&self) -> bool {
            false
        }
    }

    struct StepRng(u32);
    impl Rng for StepRng {
        fn next_u32(&mut self) -> u32 {
            let v = self.0;
            self.0 = self.0.wrapping_add(7);
            v
        }
    }

    #[test]
    fn broadcast_is_fire_and_forget() {
        let mut link = RecordingLink { writes: Vec::new(), block_next: false };
        let mut log: MessageLog<4, 4, 4> = MessageLog::new();
        let mut rng = StepRng(1);
        let mut sender = UnitSender::new(&mut rng, Address::new_unicast(b'A').unwrap(), MsgType::NeighborScan, b"HELLO", netrajaal_link::BROADCAST);
        let outcome = sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(0, &mut link, &mut log);
        assert_eq!(outcome, Some(SendOutcome::Acked { missing: AckMissing::NotApplicable }));
        assert_eq!(link.writes.len(), 1);
        assert_eq!(log.sent_len(), 1);
    }

    #[test]
    fn unicast_heartbeat_resolves_once_ack_observed() {
        let mut link = RecordingLink { writes: Vec::new(), block_next: false };
        let mut log: MessageLog<4, 4, 4> = MessageLog::new();
        let mut rng = StepRng(1);
        let mut sender = UnitSender::new(&mut rng, Address::new_unicast(b'A').unwrap(), MsgType::Heartbeat, b"A:12:34", Address::new(b'B').unwrap());
        let sent_mid = sender.mid();

        // First tick: writes the frame, moves into AwaitingProbe.
        assert_eq!(sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(0, &mut link, &mut log), None);
        assert_eq!(link.writes.len(), 1);
        assert_eq!(log.unacked_len(), 1);

        // Before the ack-sleep deadline, still pending.
        assert_eq!(sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(1, &mut link, &mut log), None);

        // Simulate the peer's ack arriving in the received log.
        let ack_mid = Mid::new(MsgType::Ack, Address::new_unicast(b'B').unwrap(), Address::new_unicast(b'A').unwrap(), *b"QQQ");
        let mut payload = crate::message_log::Payload::new();
        payload.extend_from_slice(&sent_mid.to_bytes()).unwrap();
        log.record_recv(ack_mid, &payload, 500_000_000);

        let outcome = sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(500_000_000, &mut link, &mut log);
        assert_eq!(outcome, Some(SendOutcome::Acked { missing: AckMissing::NotApplicable }));
        assert_eq!(log.sent_len(), 1);
        assert_eq!(log.unacked_len(), 0);
    }

    #[test]
    fn exhausting_all_retries_fails() {
        let mut link = RecordingLink { writes: Vec::new(), block_next: false };
        let mut log: MessageLog<16, 16, 16> = MessageLog::new();
        let mut rng = StepRng(1);
        let mut sender = UnitSender::new(&mut rng, Address::new_unicast(b'A').unwrap(), MsgType::Heartbeat, b"X", Address::new(b'B').unwrap());

        let mut now = 0u64;
        let mut outcome = None;
        for _ in 0..10_000 {
            outcome = sender.poll::<DefaultNodeTimings, 16, 16, 16, _>(now, &mut link, &mut log);
            if outcome.is_some() {
                break;
            }
            now += 1_000_000_000; // 1s per tick is plenty to blow through every deadline
        }
        assert_eq!(outcome, Some(SendOutcome::Failed));
        assert_eq!(link.writes.len(), MAX_RETRIES as usize);
    }

    #[test]
    fn write_would_block_is_retried_without_consuming_a_retry() {
        let mut link = RecordingLink { writes: Vec::new(), block_next: true };
        let mut log: MessageLog<4, 4, 4> = MessageLog::new();
        let mut rng = StepRng(1);
        let mut sender = UnitSender::new(&mut rng, Address::new_unicast(b'A').unwrap(), MsgType::Heartbeat, b"X", Address::new(b'B').unwrap());

        assert_eq!(sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(0, &mut link, &mut log), None);
        assert_eq!(link.writes.len(), 0);
        assert_eq!(sender.poll::<DefaultNodeTimings, 4, 4, 4, _>(0, &mut link, &mut log), None);
        assert_eq!(link.writes.len(), 1);
    }
}
