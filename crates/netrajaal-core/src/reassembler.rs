//! Per-transfer chunk reassembly. Keyed by `(sender, tid)` rather than
//! `tid` alone, since two senders racing a transfer with the same
//! randomly-chosen `tid` would otherwise collide (see DESIGN.md).

use heapless::Vec as HVec;
use netrajaal_common::dev_warn;
use netrajaal_link::{Address, MsgType, MIDLEN};

use crate::message_log::MissingIndices;

/// Chunk payload capacity; matches `netrajaal_link::CHUNK_PAYLOAD_SIZE`.
pub const CHUNK_PAYLOAD_SIZE: usize = netrajaal_link::CHUNK_PAYLOAD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddChunkOutcome {
    Stored,
    /// No matching `(sender, tid)` transfer is in progress; the chunk is
    /// logged and dropped.
    UnknownTransfer,
    /// Transfer is known but this reassembler has no room for another
    /// distinct index (embedded capacity exhausted); chunk dropped.
    ChunkTableFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddChunkParseError;

#[derive(Debug, Clone)]
pub enum EndOutcome {
    Complete(HVec<u8, MAX_RECOMPILED_PAYLOAD>),
    Incomplete(MissingIndices),
}

/// Upper bound on a single transfer's recompiled payload: big enough to
/// hold every chunk of the largest `MAX_CHUNKS_PER_TRANSFER` a caller is
/// expected to configure (see that constant's doc comment). Callers
/// instantiating [`Reassembler`] with a larger per-transfer chunk capacity
/// must raise this too, or `end()`'s recompiled payload silently truncates.
pub const MAX_RECOMPILED_PAYLOAD: usize = 128 * CHUNK_PAYLOAD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TransferKey {
    sender: Address,
    tid: [u8; 3],
}

struct ChunkEntry {
    index: u16,
    data: HVec<u8, CHUNK_PAYLOAD_SIZE>,
}

struct Transfer<const MAX_CHUNKS_PER_TRANSFER: usize> {
    inner_type: MsgType,
    expected_count: u16,
    chunks: HVec<ChunkEntry, MAX_CHUNKS_PER_TRANSFER>,
}

/// Tracks in-progress chunked transfers. `MAX_TRANSFERS` bounds how many
/// distinct `(sender, tid)` sessions can be open concurrently;
/// `MAX_CHUNKS_PER_TRANSFER` bounds how many distinct chunk indices a single
/// one of those sessions can hold at once — this must cover the largest
/// `count` an inbound `Begin` can declare (up to 100 chunks in a single
/// transfer is expected), or chunks past the cap are dropped and reported
/// as permanently missing. Callers on tightly memory-constrained targets
/// that only ever see small transfers can pick a smaller value than a
/// general-purpose node would.
pub struct Reassembler<const MAX_TRANSFERS: usize, const MAX_CHUNKS_PER_TRANSFER: usize> {
    transfers: HVec<(TransferKey, Transfer<MAX_CHUNKS_PER_TRANSFER>), MAX_TRANSFERS>,
}

impl<const MAX_TRANSFERS: usize, const MAX_CHUNKS_PER_TRANSFER: usize>
    Reassembler<MAX_TRANSFERS, MAX_CHUNKS_PER_TRANSFER>
{
    pub const fn new() -> Self {
        Reassembler { transfers: HVec::new() }
    }

    fn find(&self, key: &TransferKey) -> Option<usize> {
        self.transfers.iter().position(|(k, _)| k == key)
    }

    /// `payload` is the Begin frame's payload: `{inner_type}:{tid}:{count}`.
    pub fn begin(&mut self, sender: Address, payload: &[u8]) -> Result<(), BeginParseError> {
        let (type_byte, rest) = split_first_colon(payload).ok_or(BeginParseError)?;
        if type_byte.len() != 1 {
            return Err(BeginParseError);
        }
        let inner_type = MsgType::from_byte(type_byte[0]).map_err(|_| BeginParseError)?;
        let (tid_bytes, count_bytes) = split_first_colon(rest).ok_or(BeginParseError)?;
        if tid_bytes.len() != 3 {
            return Err(BeginParseError);
        }
        let tid = [tid_bytes[0], tid_bytes[1], tid_bytes[2]];
        let count_text = core::str::from_utf8(count_bytes).map_err(|_| BeginParseError)?;
        let expected_count: u16 = count_text.parse().map_err(|_| BeginParseError)?;

        let key = TransferKey { sender, tid };
        let transfer = Transfer { inner_type, expected_count, chunks: HVec::new() };
        if let Some(pos) = self.find(&key) {
            self.transfers[pos].1 = transfer;
        } else {
            // Evict the oldest open transfer to make room; a constrained
            // node holding more concurrent inbound transfers than its
            // table allows must drop the stalest one rather than refuse a
            // new Begin outright.
            if self.transfers.is_full() && !self.transfers.is_empty() {
                dev_warn!("transfer table full, evicting oldest open transfer to admit {}", sender);
                self.transfers.remove(0);
            }
            let _ = self.transfers.push((key, transfer));
        }
        Ok(())
    }

    /// `payload` is an Intermediate-chunk frame's payload: `{tid}:{index}:{data}`.
    pub fn add(&mut self, sender: Address, payload: &[u8]) -> Result<AddChunkOutcome, AddChunkParseError> {
        let (tid_bytes, rest) = split_first_colon(payload).ok_or(AddChunkParseError)?;
        if tid_bytes.len() != 3 {
            return Err(AddChunkParseError);
        }
        let tid = [tid_bytes[0], tid_bytes[1], tid_bytes[2]];
        let (index_bytes, data) = split_first_colon(rest).ok_or(AddChunkParseError)?;
        let index_text = core::str::from_utf8(index_bytes).map_err(|_| AddChunkParseError)?;
        let index: u16 = index_text.parse().map_err(|_| AddChunkParseError)?;

        let key = TransferKey { sender, tid };
        let Some(pos) = self.find(&key) else {
            return Ok(AddChunkOutcome::UnknownTransfer);
        };
        let transfer = &mut self.transfers[pos].1;
        if transfer.chunks.iter().any(|c| c.index == index) {
            // Duplicate: retrieval uses first match, so this is a no-op.
            return Ok(AddChunkOutcome::Stored);
        }
        let mut buf = HVec::new();
        let _ = buf.extend_from_slice(&data[..data.len().min(buf.capacity())]);
        if transfer.chunks.push(ChunkEntry { index, data: buf }).is_err() {
            dev_warn!("chunk table full for transfer from {}, dropping index {}", sender, index);
            return Ok(AddChunkOutcome::ChunkTableFull);
        }
        Ok(AddChunkOutcome::Stored)
    }

    /// Indices in `0..expected_count` not yet present. Unknown `(sender,
    /// tid)` returns empty, per §4.8's "defensive" rule.
    pub fn missing(&self, sender: Address, tid: [u8; 3]) -> MissingIndices {
        let mut out = MissingIndices::new();
        let key = TransferKey { sender, tid };
        let Some(pos) = self.find(&key) else {
            return out;
        };
        let transfer = &self.transfers[pos].1;
        for i in 0..transfer.expected_count {
            if !transfer.chunks.iter().any(|c| c.index == i) {
                let _ = out.push(i);
            }
        }
        out
    }

    /// Resolves the transfer: if complete, recompiles the payload in index
    /// order and clears the entry; otherwise reports what's missing and
    /// leaves the entry open for a future repair round.
    pub fn end(&mut self, sender: Address, tid: [u8; 3]) -> EndOutcome {
        let missing = self.missing(sender, tid);
        if !missing.is_empty() {
            return EndOutcome::Incomplete(missing);
        }
        let key = TransferKey { sender, tid };
        let Some(pos) = self.find(&key) else {
            return EndOutcome::Incomplete(MissingIndices::new());
        };
        let (_, transfer) = self.transfers.remove(pos);
        let mut out = HVec::new();
        for index in 0..transfer.expected_count {
            if let Some(chunk) = transfer.chunks.iter().find(|c| c.index == index) {
                let _ = out.extend_from_slice(chunk.data.as_slice());
            }
        }
        EndOutcome::Complete(out)
    }

    pub fn inner_type(&self, sender: Address, tid: [u8; 3]) -> Option<MsgType> {
        self.find(&TransferKey { sender, tid }).map(|pos| self.transfers[pos].1.inner_type)
    }
}

fn split_first_colon(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b':')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

/// Renders `missing` as a comma-joined decimal string into `out`, adding
/// each next index only while `1 + 2*MIDLEN + out.len()` still fits in
/// `frame_size` (§4.8's truncation rule: `;` plus the acked MID is the
/// other half of the ack frame this string shares a budget with).
pub fn truncate_missing_for_frame(missing: &[u16], frame_size: usize) -> MissingIndices {
    let overhead = 1 + 2 * MIDLEN;
    let mut rendered_len = 0usize;
    let mut out = MissingIndices::new();
    for (i, &index) in missing.iter().enumerate() {
        let mut digits = [0u8; 5];
        let n = crate::decimal::write_u16(index, &mut digits);
        let sep = if i == 0 { 0 } else { 1 };
        let candidate_len = rendered_len + sep + n;
        if overhead + candidate_len > frame_size {
            break;
        }
        rendered_len = candidate_len;
        if out.push(index).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use netrajaal_link::Address;

    fn a(c: u8) -> Address {
        Address::new_unicast(c).unwrap()
    }

    #[test]
    fn begin_then_add_then_end_recompiles_in_order() {
        let mut r: Reassembler<4, 8> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:2").unwrap();
        assert_eq!(r.add(a(b'A'), b"XYZ:1:World").unwrap(), AddChunkOutcome::Stored);
        assert_eq!(r.add(a(b'A'), b"XYZ:0:Hello").unwrap(), AddChunkOutcome::Stored);
        match r.end(a(b'A'), *b"XYZ") {
            EndOutcome::Complete(payload) => assert_eq!(payload.as_slice(), b"HelloWorld"),
            EndOutcome::Incomplete(_) => panic!("expected complete"),
        }
    }

    #[test]
    fn missing_reports_unreceived_indices() {
        let mut r: Reassembler<4, 8> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:5").unwrap();
        r.add(a(b'A'), b"XYZ:0:a").unwrap();
        r.add(a(b'A'), b"XYZ:2:c").unwrap();
        let missing = r.missing(a(b'A'), *b"XYZ");
        assert_eq!(missing.as_slice(), &[1u16, 3, 4]);
    }

    #[test]
    fn unknown_transfer_add_is_degenerate() {
        let mut r: Reassembler<4, 8> = Reassembler::new();
        assert_eq!(r.add(a(b'A'), b"ZZZ:0:x").unwrap(), AddChunkOutcome::UnknownTransfer);
        assert!(r.missing(a(b'A'), *b"ZZZ").is_empty());
    }

    #[test]
    fn duplicate_chunk_is_idempotent() {
        let mut r: Reassembler<4, 8> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:1").unwrap();
        r.add(a(b'A'), b"XYZ:0:first").unwrap();
        r.add(a(b'A'), b"XYZ:0:second").unwrap();
        match r.end(a(b'A'), *b"XYZ") {
            EndOutcome::Complete(payload) => assert_eq!(payload.as_slice(), b"first"),
            EndOutcome::Incomplete(_) => panic!("expected complete"),
        }
    }

    #[test]
    fn different_senders_with_same_tid_do_not_collide() {
        let mut r: Reassembler<4, 8> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:1").unwrap();
        r.begin(a(b'B'), b"H:XYZ:1").unwrap();
        r.add(a(b'A'), b"XYZ:0:fromA").unwrap();
        r.add(a(b'B'), b"XYZ:0:fromB").unwrap();
        match r.end(a(b'A'), *b"XYZ") {
            EndOutcome::Complete(p) => assert_eq!(p.as_slice(), b"fromA"),
            _ => panic!(),
        }
        match r.end(a(b'B'), *b"XYZ") {
            EndOutcome::Complete(p) => assert_eq!(p.as_slice(), b"fromB"),
            _ => panic!(),
        }
    }

    #[test]
    fn hundred_chunk_transfer_is_admitted_and_recompiles() {
        let mut r: Reassembler<4, 128> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:100").unwrap();
        for i in 0..100u16 {
            let mut payload: std::vec::Vec<u8> = std::format!("XYZ:{}:", i).into_bytes();
            payload.push(b'a' + (i % 26) as u8);
            assert_eq!(r.add(a(b'A'), &payload).unwrap(), AddChunkOutcome::Stored);
        }
        assert!(r.missing(a(b'A'), *b"XYZ").is_empty());
        match r.end(a(b'A'), *b"XYZ") {
            EndOutcome::Complete(payload) => assert_eq!(payload.len(), 100),
            EndOutcome::Incomplete(missing) => panic!("expected complete, missing {missing:?}"),
        }
    }

    #[test]
    fn chunk_beyond_table_capacity_is_reported_full_not_silently_stored() {
        let mut r: Reassembler<4, 4> = Reassembler::new();
        r.begin(a(b'A'), b"H:XYZ:5").unwrap();
        for i in 0..4u16 {
            let payload = std::format!("XYZ:{}:x", i);
            assert_eq!(r.add(a(b'A'), payload.as_bytes()).unwrap(), AddChunkOutcome::Stored);
        }
        assert_eq!(r.add(a(b'A'), b"XYZ:4:x").unwrap(), AddChunkOutcome::ChunkTableFull);
    }

    #[test]
    fn truncation_keeps_the_ack_frame_within_budget() {
        let many: std::vec::Vec<u16> = (0..100).collect();
        let truncated = truncate_missing_for_frame(&many, 225);
        // 225 - (1 + 2*6) = 212 bytes of room for the comma list.
        let rendered: std::string::String = truncated
            .iter()
            .map(|n| n.to_string())
            .collect::<std::vec::Vec<_>>()
            .join(",");
        assert!(rendered.len() <= 212);
        assert!(truncated.len() < many.len());
    }
}
