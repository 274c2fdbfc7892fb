//! Command-line demo: runs one protocol node over a real serial port.

use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use netrajaal_common::link::{LinkRead, LinkReadError, LinkWrite, LinkWriteError};
use netrajaal_common::time::Clock;
use netrajaal_core::Node;
use netrajaal_link::{Address, DefaultNodeTimings, MsgType, NodeTimings};
use netrajaal_sim::{StdClock, StdRng};
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

const SENT_CAP: usize = 32;
const UNACKED_CAP: usize = 32;
const RECV_CAP: usize = 32;
const MAX_TRANSFERS: usize = 4;
const MAX_CHUNKS_PER_TRANSFER: usize = 128;
const MAX_NEIGHBORS: usize = 16;
const MAX_PATH: usize = 16;
const MAX_OUTGOING_PAYLOAD: usize = 2048;

/// Reads whatever bytes are available from a [`SerialPort`] without
/// blocking, and buffers them until a full `\n`-terminated line has
/// arrived.
struct SerialLink {
    port: SerialPort,
    buf: Vec<u8>,
}

impl SerialLink {
    fn open(path: &str, baud_rate: u32) -> std::io::Result<Self> {
        let mut port = SerialPort::open(path, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_parity(Parity::None);
            settings.set_stop_bits(StopBits::One);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })?;
        port.set_read_timeout(Duration::ZERO)?;
        Ok(SerialLink { port, buf: Vec::new() })
    }
}

impl LinkRead for SerialLink {
    fn poll_line(&mut self, out: &mut [u8]) -> Result<usize, LinkReadError> {
        use std::io::Read;
        let mut chunk = [0u8; 256];
        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("serial read error: {e}");
                    break;
                }
            }
        }

        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            return Err(LinkReadError::WouldBlock);
        };
        let line = self.buf.drain(..=pos).collect::<Vec<u8>>();
        let line = &line[..line.len() - 1];
        if line.len() > out.len() {
            return Err(LinkReadError::BufferOverflow);
        }
        out[..line.len()].copy_from_slice(line);
        Ok(line.len())
    }
}

impl LinkWrite for SerialLink {
    fn write_line(&mut self, buf: &[u8]) -> Result<(), LinkWriteError> {
        use std::io::Write;
        self.port.write_all(buf).map_err(|_| LinkWriteError::WouldBlock)?;
        self.port.write_all(b"\n").map_err(|_| LinkWriteError::WouldBlock)?;
        Ok(())
    }

    fn is_tx_busy(&self) -> bool {
        false
    }
}

/// Runs a single mesh-relay node over a serial link for manual testing and
/// demonstration.
#[derive(Parser, Debug)]
struct Args {
    /// Serial device path, e.g. /dev/ttyUSB0.
    port: String,

    #[clap(long, default_value_t = 57600)]
    baud_rate: u32,

    /// This node's address, a single uppercase letter.
    #[clap(long)]
    address: char,

    /// Run as the coordinator (CC): never originates heartbeats, treats
    /// itself as the root of the shortest-path tree.
    #[clap(long, default_value_t = false)]
    is_cc: bool,

    /// Simulated inbound-drop percentage, for exercising retry/retransmit
    /// behavior over an otherwise-reliable serial link.
    #[clap(long, default_value_t = 0)]
    flakiness_percent: u8,

    /// Sends one message of the given type/payload to `send_to` on
    /// startup, then keeps running as a normal node.
    #[clap(long)]
    send_payload: Option<String>,

    #[clap(long)]
    send_to: Option<char>,
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Trace).parse_default_env().init();

    let args = Args::parse();
    let my_addr = Address::new_unicast(args.address as u8).expect("address must be A-Z");

    let link = SerialLink::open(&args.port, args.baud_rate).expect("failed to open serial port");
    // Cloning shares the same epoch, so timestamps taken from either handle
    // stay consistent; the clone goes to the node, the original stays here
    // to time `poll_outgoing`.
    let clock = StdClock::new();
    let node_clock = clock.clone();
    let rng = StdRng::from_entropy();

    let mut node: Node<
        SerialLink,
        StdClock,
        StdRng,
        SENT_CAP,
        UNACKED_CAP,
        RECV_CAP,
        MAX_TRANSFERS,
        MAX_CHUNKS_PER_TRANSFER,
        MAX_NEIGHBORS,
        MAX_PATH,
        MAX_OUTGOING_PAYLOAD,
    > = Node::new(my_addr, link, node_clock, rng, args.is_cc, args.address.to_string().as_bytes());
    node.set_flakiness_percent(args.flakiness_percent);

    if let (Some(payload), Some(to)) = (args.send_payload, args.send_to) {
        let dest = Address::new_unicast(to as u8).expect("send_to must be A-Z");
        if node.start_send(MsgType::Event, payload.as_bytes(), dest) {
            log::info!("queued outgoing message to {dest}");
        } else {
            log::warn!("a send was already in flight; skipped --send-payload");
        }
    }

    log::info!("node {my_addr} up (cc = {})", args.is_cc);
    loop {
        if let Some(event) = node.poll::<DefaultNodeTimings>() {
            log::debug!("{:?}", event);
        }
        let now = clock.nanos(clock.current_instant());
        if let Some(ok) = node.poll_outgoing::<DefaultNodeTimings>(now) {
            log::info!("outgoing transfer finished: success = {ok}");
        }
        std::thread::sleep(DefaultNodeTimings::MIN_SLEEP);
    }
}
