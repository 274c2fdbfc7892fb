//! The single owned `Node` aggregate and its cooperative scheduler: one
//! `poll()` call drives inbound processing, the periodic scan/heartbeat/path
//! tasks, and whatever reliable send is currently in flight, via a
//! `do_rx` / `do_timed_actions` / `do_tx` split.

use heapless::Vec as HVec;
use netrajaal_common::link::{LinkRead, LinkWrite};
use netrajaal_common::rng::{rand_tag, Rng};
use netrajaal_common::time::Clock;
use netrajaal_common::{dev_debug, dev_warn};
use netrajaal_link::{encode, Address, Mid, MsgType, NodeTimings, BROADCAST, MAX_ENCODED_FRAME_LEN};

use crate::chunked::ChunkedSender;
use crate::discovery::{self, Discovery};
use crate::message_log::MessageLog;
use crate::reassembler::Reassembler;
use crate::receiver::{self, ReceivedEvent};
use crate::unit_sender::UnitSender;

const SCAN_ID_CAP: usize = 16;
const PATH_PAYLOAD_CAP: usize = 64;

/// Ties together the message log, chunk reassembler, neighbor/path
/// discovery state, and the one outgoing reliable send that may be in
/// flight at a time, behind a single generic `poll()`.
pub struct Node<
    L,
    C,
    R,
    const SENT_CAP: usize,
    const UNACKED_CAP: usize,
    const RECV_CAP: usize,
    const MAX_TRANSFERS: usize,
    const MAX_CHUNKS_PER_TRANSFER: usize,
    const MAX_NEIGHBORS: usize,
    const MAX_PATH: usize,
    const MAX_OUTGOING_PAYLOAD: usize,
> where
    L: LinkRead + LinkWrite,
    C: Clock,
    R: Rng,
{
    my_addr: Address,
    link: L,
    clock: C,
    rng: R,

    log: MessageLog<SENT_CAP, UNACKED_CAP, RECV_CAP>,
    reassembler: Reassembler<MAX_TRANSFERS, MAX_CHUNKS_PER_TRANSFER>,
    discovery: Discovery<MAX_NEIGHBORS, MAX_PATH>,

    /// Simulated inbound-drop percentage; zero in production.
    flakiness_percent: u8,
    scan_identifier: HVec<u8, SCAN_ID_CAP>,

    last_scan_nanos: Option<u64>,
    last_heartbeat_nanos: Option<u64>,
    last_path_nanos: Option<u64>,

    heartbeat_in_flight: Option<UnitSender>,
    outgoing_transfer: Option<ChunkedSender<MAX_OUTGOING_PAYLOAD>>,

    line_buf: [u8; MAX_ENCODED_FRAME_LEN],
}

impl<
        L,
        C,
        R,
        const SENT_CAP: usize,
        const UNACKED_CAP: usize,
        const RECV_CAP: usize,
        const MAX_TRANSFERS: usize,
        const MAX_CHUNKS_PER_TRANSFER: usize,
        const MAX_NEIGHBORS: usize,
        const MAX_PATH: usize,
        const MAX_OUTGOING_PAYLOAD: usize,
    >
    Node<
        L,
        C,
        R,
        SENT_CAP,
        UNACKED_CAP,
        RECV_CAP,
        MAX_TRANSFERS,
        MAX_CHUNKS_PER_TRANSFER,
        MAX_NEIGHBORS,
        MAX_PATH,
        MAX_OUTGOING_PAYLOAD,
    >
where
    L: LinkRead + LinkWrite,
    C: Clock,
    R: Rng,
{
    pub fn new(my_addr: Address, link: L, clock: C, rng: R, is_cc: bool, scan_identifier: &[u8]) -> Self {
        let mut id = HVec::new();
        let _ = id.extend_from_slice(&scan_identifier[..scan_identifier.len().min(id.capacity())]);
        Node {
            my_addr,
            link,
            clock,
            rng,
            log: MessageLog::new(),
            reassembler: Reassembler::new(),
            discovery: Discovery::new(is_cc),
            flakiness_percent: 0,
            scan_identifier: id,
            last_scan_nanos: None,
            last_heartbeat_nanos: None,
            last_path_nanos: None,
            heartbeat_in_flight: None,
            outgoing_transfer: None,
            line_buf: [0u8; MAX_ENCODED_FRAME_LEN],
        }
    }

    pub fn set_flakiness_percent(&mut self, percent: u8) {
        self.flakiness_percent = percent;
    }

    pub fn is_cc(&self) -> bool {
        self.discovery.is_cc()
    }

    pub fn neighbors(&self) -> &[Address] {
        self.discovery.neighbors()
    }

    pub fn shortest_path(&self) -> &[Address] {
        self.discovery.shortest_path()
    }

    pub fn message_log(&self) -> &MessageLog<SENT_CAP, UNACKED_CAP, RECV_CAP> {
        &self.log
    }

    /// Starts a reliable send (chunking it automatically if oversize).
    /// Returns `false` without starting anything if a previous send is
    /// still in flight; the caller must poll that one to completion first
    /// (this core drives one outgoing transfer at a time, see DESIGN.md).
    pub fn start_send(&mut self, msg_type: MsgType, payload: &[u8], dest: Address) -> bool {
        if self.outgoing_transfer.is_some() {
            return false;
        }
        self.outgoing_transfer = Some(ChunkedSender::new(&mut self.rng, self.my_addr, msg_type, payload, dest));
        true
    }

    /// Non-blocking: `Some(result)` once the in-flight send (started via
    /// [`start_send`]) resolves, `None` while still pending or if nothing
    /// is in flight.
    pub fn poll_outgoing<Timings: NodeTimings>(&mut self, now_nanos: u64) -> Option<bool> {
        let result = self.outgoing_transfer.as_mut()?.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L, R>(
            now_nanos,
            &mut self.link,
            &mut self.log,
            &mut self.rng,
        );
        if result.is_some() {
            self.outgoing_transfer = None;
        }
        result
    }

    /// One cooperative scheduler tick: read one inbound line if available,
    /// run whatever periodic tasks are due, and advance any in-flight
    /// heartbeat/transfer send. Returns the inbound event processed this
    /// tick, if any.
    pub fn poll<Timings: NodeTimings>(&mut self) -> Option<ReceivedEvent> {
        let now = self.clock.nanos(self.clock.current_instant());
        let event = self.do_rx(now);
        self.do_timed_actions::<Timings>(now);
        self.do_tx::<Timings>(now);
        event
    }

    fn do_rx(&mut self, now: u64) -> Option<ReceivedEvent> {
        let len = match self.link.poll_line(&mut self.line_buf) {
            Ok(len) => len,
            Err(_) => return None,
        };
        let (event, ack) = receiver::process_line(
            self.my_addr,
            &self.line_buf[..len],
            now,
            self.flakiness_percent,
            &mut self.rng,
            &mut self.log,
            &mut self.reassembler,
            &mut self.discovery,
        );
        if let Some(ack) = ack {
            self.send_fire_and_forget(MsgType::Ack, &ack.payload, ack.dest, now);
        }
        match &event {
            ReceivedEvent::Dropped(reason) => dev_warn!("dropped inbound frame: {:?}", reason),
            ReceivedEvent::PathUpdated { source } => {
                dev_debug!("adopted a shorter path to CC via {}", source);
                self.advertise_path(now);
            }
            _ => {}
        }
        Some(event)
    }

    fn do_timed_actions<Timings: NodeTimings>(&mut self, now: u64) {
        if is_due(self.last_scan_nanos, now, Timings::SCAN_INTERVAL.as_nanos() as u64) {
            let id = self.scan_identifier.clone();
            self.send_fire_and_forget(MsgType::NeighborScan, &id, BROADCAST, now);
            self.last_scan_nanos = Some(now);
        }

        if !self.discovery.is_cc() && is_due(self.last_heartbeat_nanos, now, Timings::HEARTBEAT_INTERVAL.as_nanos() as u64)
        {
            if self.heartbeat_in_flight.is_none() {
                if let Some(&first_hop) = self.discovery.shortest_path().first() {
                    let mm_ss = self.clock.format_mm_ss(self.clock.current_instant());
                    let payload = heartbeat_payload(self.my_addr, mm_ss.minutes, mm_ss.seconds);
                    self.heartbeat_in_flight =
                        Some(UnitSender::new(&mut self.rng, self.my_addr, MsgType::Heartbeat, &payload, first_hop));
                }
            }
            self.last_heartbeat_nanos = Some(now);
        }

        if is_due(self.last_path_nanos, now, Timings::PATH_INTERVAL.as_nanos() as u64) {
            self.advertise_path(now);
            self.last_path_nanos = Some(now);
        }
    }

    fn do_tx<Timings: NodeTimings>(&mut self, now: u64) {
        if let Some(sender) = &mut self.heartbeat_in_flight {
            if let Some(outcome) = sender.poll::<Timings, SENT_CAP, UNACKED_CAP, RECV_CAP, L>(now, &mut self.link, &mut self.log) {
                if !outcome.is_success() {
                    dev_warn!("heartbeat to first hop went unacked after every retry");
                }
                self.heartbeat_in_flight = None;
            }
        }
    }

    /// Re-advertises this node's knowledge of the path to CC to every
    /// known neighbor: CC advertises its own address, others advertise
    /// `my_addr` prefixed onto their current shortest path.
    fn advertise_path(&mut self, now: u64) {
        let mut neighbors: HVec<Address, MAX_NEIGHBORS> = HVec::new();
        let _ = neighbors.extend_from_slice(self.discovery.neighbors());

        let payload: HVec<u8, PATH_PAYLOAD_CAP> = if self.discovery.is_cc() {
            let mut p = HVec::new();
            let _ = p.push(self.my_addr.byte());
            p
        } else {
            let path = self.discovery.shortest_path();
            if path.is_empty() {
                return;
            }
            discovery::build_advertisement(self.my_addr, path)
        };

        for neighbor in neighbors {
            self.send_fire_and_forget(MsgType::ShortestPath, &payload, neighbor, now);
        }
    }

    /// Writes a frame once, best-effort; used for every message type that
    /// the protocol never acks (`N`, `S`, `A`). A `WouldBlock` simply skips
    /// this attempt, same as a dropped broadcast would.
    fn send_fire_and_forget(&mut self, msg_type: MsgType, payload: &[u8], dest: Address, now: u64) {
        let tag = rand_tag(&mut self.rng);
        let mid = Mid::new(msg_type, self.my_addr, dest, tag);
        let mut buf = [0u8; MAX_ENCODED_FRAME_LEN];
        let Ok(n) = encode(mid, payload, &mut buf) else {
            return;
        };
        if self.link.write_line(&buf[..n]).is_ok() {
            self.log.record_sent(mid, payload, now);
        }
    }
}

fn is_due(last: Option<u64>, now: u64, interval_nanos: u64) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_sub(last) >= interval_nanos,
    }
}

/// Renders `{my_addr}:{MM}:{SS}`, zero-padded, matching the heartbeat
/// payload format used throughout the worked examples (e.g. `A:12:34`).
fn heartbeat_payload(my_addr: Address, minutes: u8, seconds: u8) -> HVec<u8, 8> {
    let mut out = HVec::new();
    let _ = out.push(my_addr.byte());
    let _ = out.push(b':');
    push_two_digits(&mut out, minutes);
    let _ = out.push(b':');
    push_two_digits(&mut out, seconds);
    out
}

fn push_two_digits(out: &mut HVec<u8, 8>, value: u8) {
    let _ = out.push(b'0' + (value / 10) % 10);
    let _ = out.push(b'0' + value % 10);
}
