use crate::address::{Address, InvalidAddress};
use core::fmt;

pub const MIDLEN: usize = 6;

/// The eight message types the protocol distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// Heartbeat; ack required when unicast.
    Heartbeat,
    /// Acknowledgement; never itself acked.
    Ack,
    /// Begin of a chunked transfer; ack required.
    Begin,
    /// Intermediate chunk; no ack individually.
    IntermediateChunk,
    /// End of a chunked transfer; ack required, ack payload carries the
    /// missing-chunk list.
    End,
    /// Neighbor scan / announcement; broadcast, no ack.
    NeighborScan,
    /// Shortest-path-to-CC advertisement; unicast, no ack.
    ShortestPath,
    /// Reserved event type.
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMsgType;

impl MsgType {
    pub const fn to_byte(self) -> u8 {
        match self {
            MsgType::Heartbeat => b'H',
            MsgType::Ack => b'A',
            MsgType::Begin => b'B',
            MsgType::IntermediateChunk => b'I',
            MsgType::End => b'E',
            MsgType::NeighborScan => b'N',
            MsgType::ShortestPath => b'S',
            MsgType::Event => b'V',
        }
    }

    pub const fn from_byte(byte: u8) -> Result<Self, UnknownMsgType> {
        match byte {
            b'H' => Ok(MsgType::Heartbeat),
            b'A' => Ok(MsgType::Ack),
            b'B' => Ok(MsgType::Begin),
            b'I' => Ok(MsgType::IntermediateChunk),
            b'E' => Ok(MsgType::End),
            b'N' => Ok(MsgType::NeighborScan),
            b'S' => Ok(MsgType::ShortestPath),
            b'V' => Ok(MsgType::Event),
            _ => Err(UnknownMsgType),
        }
    }

    /// Whether a unicast message of this type requires an acknowledgement.
    /// Broadcast messages are never acked regardless of type.
    pub const fn needs_ack(self) -> bool {
        matches!(self, MsgType::Heartbeat | MsgType::Begin | MsgType::End)
    }
}

/// A 6-byte message identifier: `T S D R R R` (type, source, destination,
/// three random collision-avoidance letters). Not a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mid {
    pub msg_type: MsgType,
    pub source: Address,
    pub dest: Address,
    pub tag: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidParseError {
    WrongLength,
    UnknownMsgType,
    InvalidAddress,
}

impl From<InvalidAddress> for MidParseError {
    fn from(_: InvalidAddress) -> Self {
        MidParseError::InvalidAddress
    }
}

impl From<UnknownMsgType> for MidParseError {
    fn from(_: UnknownMsgType) -> Self {
        MidParseError::UnknownMsgType
    }
}

impl Mid {
    pub fn new(msg_type: MsgType, source: Address, dest: Address, tag: [u8; 3]) -> Self {
        Mid { msg_type, source, dest, tag }
    }

    pub fn to_bytes(self) -> [u8; MIDLEN] {
        [
            self.msg_type.to_byte(),
            self.source.byte(),
            self.dest.byte(),
            self.tag[0],
            self.tag[1],
            self.tag[2],
        ]
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, MidParseError> {
        if bytes.len() != MIDLEN {
            return Err(MidParseError::WrongLength);
        }
        let msg_type = MsgType::from_byte(bytes[0])?;
        let source = Address::new_unicast(bytes[1])?;
        let dest = Address::new(bytes[2])?;
        for &b in &bytes[3..6] {
            if !b.is_ascii_uppercase() {
                return Err(MidParseError::InvalidAddress);
            }
        }
        Ok(Mid { msg_type, source, dest, tag: [bytes[3], bytes[4], bytes[5]] })
    }

    /// Whether an ack produced by a peer for this MID is expected at all,
    /// i.e. the send was unicast and of a type that requires acking.
    pub const fn ack_expected(self) -> bool {
        !self.dest.is_broadcast() && self.msg_type.needs_ack()
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        for b in bytes {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mid = Mid::new(
            MsgType::Heartbeat,
            Address::new_unicast(b'A').unwrap(),
            Address::new(b'B').unwrap(),
            *b"XYZ",
        );
        let bytes = mid.to_bytes();
        assert_eq!(&bytes, b"HABXYZ");
        let parsed = Mid::parse(&bytes).unwrap();
        assert_eq!(parsed, mid);
    }

    #[test]
    fn accepts_broadcast_destination() {
        let bytes = b"NA*XYZ";
        let parsed = Mid::parse(bytes).unwrap();
        assert!(parsed.dest.is_broadcast());
    }

    #[test]
    fn rejects_broadcast_source() {
        let bytes = b"N*BXYZ";
        assert_eq!(Mid::parse(bytes), Err(MidParseError::InvalidAddress));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = b"ZABXYZ";
        assert_eq!(Mid::parse(bytes), Err(MidParseError::UnknownMsgType));
    }

    #[test]
    fn ack_expected_only_for_unicast_acked_types() {
        let to_bcast = Mid::new(MsgType::Heartbeat, Address::new_unicast(b'A').unwrap(), BROADCAST_ADDR, *b"AAA");
        assert!(!to_bcast.ack_expected());

        let scan = Mid::new(MsgType::NeighborScan, Address::new_unicast(b'A').unwrap(), Address::new(b'B').unwrap(), *b"AAA");
        assert!(!scan.ack_expected());

        let begin = Mid::new(MsgType::Begin, Address::new_unicast(b'A').unwrap(), Address::new(b'B').unwrap(), *b"AAA");
        assert!(begin.ack_expected());
    }

    const BROADCAST_ADDR: Address = crate::address::BROADCAST;
}
