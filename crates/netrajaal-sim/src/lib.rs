//! Host-side adapters so the `no_std` protocol core in `netrajaal-core` can
//! run against real wall-clock time, real randomness, and either an
//! in-memory loopback medium (for demos and integration tests) or a real
//! serial port (see `main.rs`).

use std::collections::VecDeque;
use std::rc::Rc;
use std::cell::RefCell;
use std::time::Instant;

use netrajaal_common::link::{LinkRead, LinkReadError, LinkWrite, LinkWriteError};
use netrajaal_common::rng::Rng;
use netrajaal_common::time::{Clock, TimeDiff};
use netrajaal_link::NodeTimings;
use rand::RngCore;
use rand::SeedableRng;

/// Faster [`NodeTimings`] for integration tests, so a scenario that would
/// take minutes of real scan/heartbeat/path intervals converges in a few
/// simulated seconds instead.
pub struct TestNodeTimings;

impl NodeTimings for TestNodeTimings {
    const MIN_SLEEP: std::time::Duration = std::time::Duration::from_millis(10);
    const ACK_SLEEP: std::time::Duration = std::time::Duration::from_millis(50);
    const SCAN_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);
    const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);
    const PATH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Clone)]
pub struct StdClock {
    epoch: Instant,
}

#[derive(Clone, Copy)]
pub struct StdInstant(u64);

impl StdClock {
    pub fn new() -> Self {
        StdClock { epoch: Instant::now() }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    type TInstant = StdInstant;

    fn current_instant(&self) -> Self::TInstant {
        StdInstant(self.epoch.elapsed().as_nanos() as u64)
    }

    fn diff(&self, newer: Self::TInstant, older: Self::TInstant) -> TimeDiff {
        if newer.0 >= older.0 {
            TimeDiff::Forward(std::time::Duration::from_nanos(newer.0 - older.0))
        } else {
            TimeDiff::Backward(std::time::Duration::from_nanos(older.0 - newer.0))
        }
    }

    fn nanos(&self, instant: Self::TInstant) -> u64 {
        instant.0
    }
}

/// [`Rng`] backed by the `rand` crate's non-cryptographic, OS-seeded PRNG.
/// Good enough for collision-avoidance tags and the simulated flakiness
/// knob; never used for anything security-sensitive.
pub struct StdRng(rand::rngs::StdRng);

impl StdRng {
    pub fn from_entropy() -> Self {
        StdRng(rand::rngs::StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        StdRng(rand::rngs::StdRng::seed_from_u64(seed))
    }
}

impl Rng for StdRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
}

type Mailbox = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// One half of an in-memory loopback pair, modelling the shared half-duplex
/// medium for demos and multi-node integration tests without a real serial
/// port. Writes to one side become readable from the other.
pub struct MemoryLink {
    inbox: Mailbox,
    outbox: Mailbox,
}

impl MemoryLink {
    /// Builds a connected pair: whatever `a` writes, `b` reads, and vice
    /// versa.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a_to_b: Mailbox = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a: Mailbox = Rc::new(RefCell::new(VecDeque::new()));
        let a = MemoryLink { inbox: b_to_a.clone(), outbox: a_to_b.clone() };
        let b = MemoryLink { inbox: a_to_b, outbox: b_to_a };
        (a, b)
    }
}

impl LinkWrite for MemoryLink {
    fn write_line(&mut self, buf: &[u8]) -> Result<(), LinkWriteError> {
        self.outbox.borrow_mut().push_back(buf.to_vec());
        Ok(())
    }

    fn is_tx_busy(&self) -> bool {
        false
    }
}

impl LinkRead for MemoryLink {
    fn poll_line(&mut self, buf: &mut [u8]) -> Result<usize, LinkReadError> {
        let mut inbox = self.inbox.borrow_mut();
        let Some(line) = inbox.pop_front() else {
            return Err(LinkReadError::WouldBlock);
        };
        let trimmed = line.strip_suffix(b"\n").unwrap_or(&line);
        if trimmed.len() > buf.len() {
            return Err(LinkReadError::BufferOverflow);
        }
        buf[..trimmed.len()].copy_from_slice(trimmed);
        Ok(trimmed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_link_pair_delivers_in_order() {
        let (mut a, mut b) = MemoryLink::pair();
        a.write_line(b"HABXYZ;hi").unwrap();
        a.write_line(b"HABXYZ;again").unwrap();

        let mut buf = [0u8; 64];
        let n = b.poll_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"HABXYZ;hi");
        let n = b.poll_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"HABXYZ;again");
        assert_eq!(b.poll_line(&mut buf), Err(LinkReadError::WouldBlock));
    }

    #[test]
    fn std_clock_reports_forward_progress() {
        let clock = StdClock::new();
        let first = clock.current_instant();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = clock.current_instant();
        assert!(clock.nanos(second) > clock.nanos(first));
    }

    #[test]
    fn std_rng_is_deterministic_when_seeded() {
        let mut a = StdRng::seeded(42);
        let mut b = StdRng::seeded(42);
        assert_eq!(a.next_u32(), b.next_u32());
    }
}
