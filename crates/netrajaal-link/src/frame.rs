use crate::mid::{Mid, MidParseError, MIDLEN};

/// Maximum total wire-frame length: MID + `;` + payload + `\n`. Used by
/// the chunked transfer engine as the literal threshold deciding whether a
/// payload must be fragmented: a payload of `FRAME_SIZE - 1` bytes is still
/// sent unchunked, one of `FRAME_SIZE` bytes is not. Encode buffers are
/// sized to the worst case at that boundary rather than to this constant
/// exactly (see `MAX_ENCODED_FRAME_LEN`).
pub const FRAME_SIZE: usize = 225;

/// Payload size of a single chunk inside a chunked transfer.
pub const CHUNK_PAYLOAD_SIZE: usize = 200;

/// Upper bound on an encoded single frame's wire length: MID (6) + `;` (1) +
/// the largest unchunked payload accepted before chunking kicks in
/// (`FRAME_SIZE - 1`) + `\n` (1). Slightly exceeds the nominal `FRAME_SIZE`,
/// since the chunking decision compares the raw payload length against
/// `FRAME_SIZE` without netting out header/trailer overhead.
pub const MAX_ENCODED_FRAME_LEN: usize = MIDLEN + 1 + (FRAME_SIZE - 1) + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncodeError {
    BufferTooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    TooShort,
    MissingSeparator,
    Mid(MidParseError),
}

impl From<MidParseError> for FrameDecodeError {
    fn from(e: MidParseError) -> Self {
        FrameDecodeError::Mid(e)
    }
}

/// A successfully parsed inbound line: its MID and a borrow of the payload
/// bytes, trimmed of trailing whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrame<'a> {
    pub mid: Mid,
    pub payload: &'a [u8],
}

/// Encodes `mid`, `;`, `payload` and a trailing `\n` into `out`, returning
/// the number of bytes written. This is the wire representation the link
/// transfers verbatim.
pub fn encode(mid: Mid, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameEncodeError> {
    let total = MIDLEN + 1 + payload.len() + 1;
    if out.len() < total {
        return Err(FrameEncodeError::BufferTooSmall);
    }
    out[0..MIDLEN].copy_from_slice(&mid.to_bytes());
    out[MIDLEN] = b';';
    out[MIDLEN + 1..MIDLEN + 1 + payload.len()].copy_from_slice(payload);
    out[total - 1] = b'\n';
    Ok(total)
}

/// Parses one line (as yielded by the link, i.e. without its trailing
/// `\n`) into a MID and payload.
///
/// Parse rules: length >= 8; the 6 MID bytes must be uppercase
/// letters, except the destination byte (index 2, the `D` in the `T S D R
/// R R` layout) which may also be `*`; byte 6 must be `;`; the remainder is
/// the payload, trimmed of trailing whitespace.
pub fn parse(line: &[u8]) -> Result<ParsedFrame<'_>, FrameDecodeError> {
    if line.len() < 8 {
        return Err(FrameDecodeError::TooShort);
    }
    if line[MIDLEN] != b';' {
        return Err(FrameDecodeError::MissingSeparator);
    }
    let mid = Mid::parse(&line[0..MIDLEN])?;
    let mut payload = &line[MIDLEN + 1..];
    while let [rest @ .., last] = payload {
        if last.is_ascii_whitespace() {
            payload = rest;
        } else {
            break;
        }
    }
    Ok(ParsedFrame { mid, payload })
}
