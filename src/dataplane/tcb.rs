//! TCP control block and connection state machine
//!
//! Only passive open is implemented: Listen -> SynReceived -> Established.
//! Every other RFC 793 state is still a variant of [`TcpState`] and has its
//! own arm in [`Tcb::on_segment`], where segments are logged and ignored.

use super::sequence::{seq_in_window, seq_le};
use crate::protocol::ipv4::DEFAULT_TTL;
use crate::protocol::tcp::TcpFlags;
use crate::protocol::{MacAddr, Segment};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Payload bytes shown when logging a segment in an unhandled state
const PAYLOAD_PREVIEW_LEN: usize = 64;

/// RFC 793 connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Closed,
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN-SENT",
            TcpState::SynReceived => "SYN-RECEIVED",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN-WAIT-1",
            TcpState::FinWait2 => "FIN-WAIT-2",
            TcpState::CloseWait => "CLOSE-WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::LastAck => "LAST-ACK",
            TcpState::TimeWait => "TIME-WAIT",
            TcpState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Send Sequence Space (RFC 793 S3.2 F4)
///
/// ```text
///            1         2          3          4
///       ----------|----------|----------|----------
///              SND.UNA    SND.NXT    SND.UNA
///                                   +SND.WND
///
/// 1 - old sequence numbers which have been acknowledged
/// 2 - sequence numbers of unacknowledged data
/// 3 - sequence numbers allowed for new data transmission
/// 4 - future sequence numbers which are not yet allowed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSequenceSpace {
    /// send unacknowledged
    pub una: u32,
    /// send next
    pub nxt: u32,
    /// send window (what we advertise)
    pub wnd: u16,
    /// segment sequence number used for last window update
    pub wl1: u32,
    /// segment acknowledgment number used for last window update
    pub wl2: u32,
    /// initial send sequence number
    pub iss: u32,
}

/// Receive Sequence Space (RFC 793 S3.2 F5)
///
/// ```text
///                1          2          3
///            ----------|----------|----------
///                   RCV.NXT    RCV.NXT
///                             +RCV.WND
///
/// 1 - old sequence numbers which have been acknowledged
/// 2 - sequence numbers allowed for new reception
/// 3 - future sequence numbers which are not yet allowed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecvSequenceSpace {
    /// receive next
    pub nxt: u32,
    /// receive window (what the peer advertised)
    pub wnd: u16,
    /// initial receive sequence number
    pub irs: u32,
}

/// Our side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoint {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// Per-session knobs
#[derive(Debug, Clone, Copy)]
pub struct TcbOptions {
    /// Window advertised in every segment we send
    pub window: u16,
    /// Require ACK=1 and ack == SND.NXT to leave SynReceived
    pub strict_handshake_ack: bool,
}

/// A segment the state machine refuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// First segment of a flow was not a bare SYN
    NotSyn { flags: TcpFlags },
    /// Handshake-completing segment did not acknowledge our SYN
    HandshakeAck {
        flags: TcpFlags,
        expected: u32,
        got: u32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotSyn { flags } => {
                write!(f, "expected SYN in LISTEN, got flags [{}]", flags)
            }
            Violation::HandshakeAck {
                flags,
                expected,
                got,
            } => write!(
                f,
                "handshake ack mismatch in SYN-RECEIVED: flags [{}], ack {} (expected {})",
                flags, got, expected
            ),
        }
    }
}

/// What the session worker must do after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to send
    None,
    /// Write this segment
    Reply(Segment),
    /// Tear the session down without replying
    Close(Violation),
}

/// Transmission control block
#[derive(Debug, Clone)]
pub struct Tcb {
    state: TcpState,
    snd: SendSequenceSpace,
    rcv: RecvSequenceSpace,
    local: LocalEndpoint,
    options: TcbOptions,
}

impl Tcb {
    /// A passive-open control block; `iss` is used if a SYN arrives
    pub fn listen(local: LocalEndpoint, iss: u32, options: TcbOptions) -> Self {
        Self {
            state: TcpState::Listen,
            snd: SendSequenceSpace {
                iss,
                una: iss,
                nxt: iss,
                wnd: options.window,
                ..Default::default()
            },
            rcv: RecvSequenceSpace::default(),
            local,
            options,
        }
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn send_space(&self) -> &SendSequenceSpace {
        &self.snd
    }

    pub fn recv_space(&self) -> &RecvSequenceSpace {
        &self.rcv
    }

    /// Mark the connection closed (write failure or teardown)
    pub fn close(&mut self) {
        self.state = TcpState::Closed;
    }

    /// Transition function: consume one inbound segment
    pub fn on_segment(&mut self, seg: &Segment) -> Effect {
        match self.state {
            TcpState::Listen => self.on_listen(seg),
            TcpState::SynReceived => self.on_syn_received(seg),
            TcpState::SynSent
            | TcpState::Established
            | TcpState::FinWait1
            | TcpState::FinWait2
            | TcpState::CloseWait
            | TcpState::Closing
            | TcpState::LastAck
            | TcpState::TimeWait
            | TcpState::Closed => {
                self.log_unhandled(seg);
                Effect::None
            }
        }
    }

    fn on_listen(&mut self, seg: &Segment) -> Effect {
        if !seg.flags.is_syn_only() {
            self.state = TcpState::Closed;
            return Effect::Close(Violation::NotSyn { flags: seg.flags });
        }

        // The SYN occupies one sequence number
        self.rcv = RecvSequenceSpace {
            irs: seg.seq,
            nxt: seg.seq.wrapping_add(1),
            wnd: seg.window,
        };

        let iss = self.snd.iss;
        self.snd.una = iss;
        self.snd.nxt = iss;
        self.snd.wnd = self.options.window;

        let reply = self.segment_to(seg, TcpFlags::SYN_ACK, self.snd.nxt);
        self.snd.nxt = iss.wrapping_add(1);
        self.state = TcpState::SynReceived;

        debug!(irs = seg.seq, iss, peer_window = seg.window, "LISTEN -> SYN-RECEIVED");
        Effect::Reply(reply)
    }

    fn on_syn_received(&mut self, seg: &Segment) -> Effect {
        let acks_syn = seg.flags.ack && seg.ack == self.snd.nxt;

        if self.options.strict_handshake_ack && !acks_syn {
            self.state = TcpState::Closed;
            return Effect::Close(Violation::HandshakeAck {
                flags: seg.flags,
                expected: self.snd.nxt,
                got: seg.ack,
            });
        }

        if seg.flags.ack && seq_in_window(seg.ack, self.snd.una, self.snd.nxt) {
            self.snd.una = seg.ack;
            self.snd.wl1 = seg.seq;
            self.snd.wl2 = seg.ack;
            self.rcv.wnd = seg.window;
        }
        debug_assert!(seq_le(self.snd.una, self.snd.nxt));

        self.state = TcpState::Established;
        info!(
            ack = seg.ack,
            snd_nxt = self.snd.nxt,
            acked = acks_syn,
            "SYN-RECEIVED -> ESTABLISHED"
        );
        Effect::None
    }

    fn log_unhandled(&self, seg: &Segment) {
        let preview = &seg.payload[..seg.payload.len().min(PAYLOAD_PREVIEW_LEN)];
        debug!(
            state = %self.state,
            flags = %seg.flags,
            seq = seg.seq,
            ack = seg.ack,
            len = seg.payload.len(),
            payload = %String::from_utf8_lossy(preview),
            snd_nxt = self.snd.nxt,
            "state not handled yet"
        );
    }

    /// Reply to `seg`'s sender from our endpoint
    fn segment_to(&self, seg: &Segment, flags: TcpFlags, seq: u32) -> Segment {
        Segment {
            src_mac: self.local.mac,
            dst_mac: seg.src_mac,
            src_ip: self.local.ip,
            dst_ip: seg.src_ip,
            ttl: DEFAULT_TTL,
            src_port: seg.dst_port,
            dst_port: seg.src_port,
            seq,
            ack: self.rcv.nxt,
            flags,
            window: self.snd.wnd,
            urgent_ptr: 0,
            payload: Vec::new(),
        }
    }
}
