/*! Wire protocol for the Netrajaal mesh relay link: the address and
 message-ID data model, plus frame encoding and parsing.

 ## Frame format

 Each frame on the wire is:

 ```
 MID (6 bytes) | ';' | payload (0..var bytes) | '\n'
 ```

 Where the MID is laid out as `T S D R R R`:
   - `T`: message type, one of `H A B E N I S V` (see [`mid::MsgType`]).
   - `S`: source address, always a concrete letter (`A`..=`Z`).
   - `D`: destination address, a letter or `*` for broadcast.
   - `R R R`: three uniformly random uppercase letters, a collision-avoidance
     tag rather than a sequence number.

 No byte stuffing is performed; the payload must never itself contain a
 `\n`. This is a protocol-level assumption, not enforced by this crate.
*/
#![no_std]

mod address;
mod frame;
mod mid;
mod timings;

pub use address::{Address, InvalidAddress, BROADCAST};
pub use frame::{
    encode, parse, FrameDecodeError, FrameEncodeError, ParsedFrame, CHUNK_PAYLOAD_SIZE,
    FRAME_SIZE, MAX_ENCODED_FRAME_LEN,
};
pub use mid::{Mid, MidParseError, MsgType, UnknownMsgType, MIDLEN};
pub use timings::{DefaultNodeTimings, NodeTimings};
