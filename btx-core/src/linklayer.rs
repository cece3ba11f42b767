//! BTX block framing, CRC and retransmission state machine over a circular send
//! buffer fed from a non-blocking TCP socket.

use std::io::{self, Read, Write};

use log::debug;

use crate::crc::update as crc_update;
use crate::ringbuffer::{forward_distance, RingBuffer};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const NACK: u8 = 0x15;
pub const DLE: u8 = 0x10;

const READLEN: usize = 32;
const ENQ_PERIOD_MS: u64 = 1000;
const NEGOTIATION_NUL_TICK: u32 = 6000;
const NEGOTIATION_RELEASE_TICK: u32 = 40000;
pub const DEFAULT_ENQ_RETRIES: u8 = 4;

/// Buffer sizing picked at construction. The older firmware variant ran with a
/// much smaller circular buffer; both shapes share identical semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkLayerConfig {
    pub blen: usize,
    pub plen: usize,
}

impl LinkLayerConfig {
    pub const fn production() -> Self {
        Self {
            blen: 1024,
            plen: 64,
        }
    }

    pub const fn compact() -> Self {
        Self {
            blen: 128,
            plen: 40,
        }
    }
}

/// Minimal duplex byte transport the link layer drives: a non-blocking TCP
/// socket in production, an in-memory double in tests.
pub trait LinkSocket {
    fn send_byte(&mut self, byte: u8) -> io::Result<()>;
    /// Non-blocking read. `Ok(0)` means the peer performed an orderly shutdown.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: Read + Write> LinkSocket for T {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutput {
    Byte(u8),
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangUp {
    SocketSend,
    SocketRecv,
    PeerDisconnected,
    EnqRetriesExhausted,
}

/// Replaces the original firmware's overloaded negative-integer cursor with a
/// tagged transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    SendingData { index: usize },
    SendingEtx,
    SendingCrcLo,
    SendingCrcHi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Negotiation {
    NoCarrier,
    Negotiating { ticks: u32 },
    SteadyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Idle,
    SawDle,
}

pub struct LinkLayer {
    ring: RingBuffer,
    plen: usize,
    border: usize,
    last: Option<usize>,
    state: TxState,
    crc: u16,
    blocklength: usize,
    negotiation: Negotiation,
    ack_state: AckState,
    last_etx: Option<u64>,
    pending_eot: bool,
    enq_retries: u8,
    enq_retries_remaining: u8,
}

impl LinkLayer {
    pub fn new(config: LinkLayerConfig, enq_retries: u8) -> Self {
        Self {
            ring: RingBuffer::new(config.blen),
            plen: config.plen,
            border: 0,
            last: None,
            state: TxState::Idle,
            crc: 0,
            blocklength: 0,
            negotiation: Negotiation::NoCarrier,
            ack_state: AckState::Idle,
            last_etx: None,
            pending_eot: false,
            enq_retries,
            enq_retries_remaining: enq_retries,
        }
    }

    pub fn with_default_retries(config: LinkLayerConfig) -> Self {
        Self::new(config, DEFAULT_ENQ_RETRIES)
    }

    pub fn is_steady_state(&self) -> bool {
        matches!(self.negotiation, Negotiation::SteadyState)
    }

    pub fn has_retained_block(&self) -> bool {
        self.last.is_some()
    }

    /// Advise of the demodulator's current carrier detect state.
    pub fn set_carrier_detect(&mut self, present: bool) {
        match (present, self.negotiation) {
            (false, _) => {
                if self.negotiation != Negotiation::NoCarrier {
                    debug!("btx: upstream carrier lost, resetting negotiation");
                }
                self.negotiation = Negotiation::NoCarrier;
            }
            (true, Negotiation::NoCarrier) => {
                debug!("btx: upstream carrier acquired, beginning negotiation");
                self.negotiation = Negotiation::Negotiating { ticks: 0 };
            }
            (true, _) => {}
        }
    }

    /// Feed a byte received from the terminal since the last `next_output` call.
    pub fn receive_byte(&mut self, byte: u8, socket: &mut impl LinkSocket) -> Result<(), HangUp> {
        if self.ack_state == AckState::SawDle {
            self.ack_state = AckState::Idle;
            match byte {
                0x30 | 0x31 | 0x3F => {
                    self.acknowledge();
                    return Ok(());
                }
                NACK => {
                    self.handle_nack();
                    return Ok(());
                }
                ACK => {
                    self.acknowledge();
                    return Ok(());
                }
                _ => return self.forward(byte, socket),
            }
        }

        match byte {
            NACK => {
                self.handle_nack();
                Ok(())
            }
            ACK => {
                self.acknowledge();
                Ok(())
            }
            DLE => {
                self.ack_state = AckState::SawDle;
                Ok(())
            }
            other => self.forward(other, socket),
        }
    }

    fn forward(&mut self, byte: u8, socket: &mut impl LinkSocket) -> Result<(), HangUp> {
        socket.send_byte(byte).map_err(|_| HangUp::SocketSend)
    }

    fn acknowledge(&mut self) {
        self.last = None;
        self.enq_retries_remaining = self.enq_retries;
    }

    fn handle_nack(&mut self) {
        if let Some(last) = self.last.take() {
            self.border = last;
            self.state = TxState::Idle;
            self.last_etx = None;
            self.enq_retries_remaining = self.enq_retries;
            self.pending_eot = true;
        }
    }

    /// Pump bytes from the socket into the outgoing ring buffer, keeping
    /// headroom for any block still retained for retransmission.
    pub fn poll_socket(&mut self, socket: &mut impl LinkSocket) -> Result<(), HangUp> {
        let lb = self.last.unwrap_or(self.border);
        let readp = self.ring.write_pos();
        let free = if lb == readp {
            self.ring.capacity()
        } else {
            forward_distance(readp, lb, self.ring.capacity())
        };
        if free <= 2 * READLEN {
            return Ok(());
        }

        let mut chunk = [0u8; READLEN];
        match socket.recv(&mut chunk) {
            Ok(0) => Err(HangUp::PeerDisconnected),
            Ok(n) => {
                for &b in &chunk[..n] {
                    self.ring.push(b);
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(_) => Err(HangUp::SocketRecv),
        }
    }

    /// Produce the next byte to modulate, or `NoData`. `now_ms` drives the ENQ
    /// timer and the negotiation window.
    pub fn next_output(&mut self, now_ms: u64) -> Result<LinkOutput, HangUp> {
        match self.negotiation {
            Negotiation::NoCarrier => return Ok(LinkOutput::NoData),
            Negotiation::Negotiating { ticks } => {
                let ticks = ticks + 1;
                if ticks > NEGOTIATION_RELEASE_TICK {
                    self.negotiation = Negotiation::SteadyState;
                } else {
                    let emit_nul = ticks == NEGOTIATION_NUL_TICK;
                    self.negotiation = Negotiation::Negotiating { ticks };
                    return Ok(if emit_nul {
                        LinkOutput::Byte(0x00)
                    } else {
                        LinkOutput::NoData
                    });
                }
            }
            Negotiation::SteadyState => {}
        }

        if self.pending_eot {
            self.pending_eot = false;
            return Ok(LinkOutput::Byte(EOT));
        }

        match self.state {
            TxState::Idle => {
                if self.border != self.ring.write_pos() {
                    self.state = TxState::SendingData { index: self.border };
                    self.crc = 0;
                    self.blocklength = 0;
                    return Ok(LinkOutput::Byte(STX));
                }
                self.check_enq(now_ms)
            }
            TxState::SendingData { index } => {
                let byte = self.ring.get(index);
                let next_index = (index + 1) % self.ring.capacity();
                self.crc = crc_update(self.crc, byte);
                self.blocklength += 1;
                if next_index == self.ring.write_pos() || self.blocklength >= self.plen {
                    self.last = Some(self.border);
                    self.border = next_index;
                    self.last_etx = Some(now_ms);
                    self.state = TxState::SendingEtx;
                } else {
                    self.state = TxState::SendingData { index: next_index };
                }
                Ok(LinkOutput::Byte(byte))
            }
            TxState::SendingEtx => {
                self.crc = crc_update(self.crc, ETX);
                self.state = TxState::SendingCrcLo;
                Ok(LinkOutput::Byte(ETX))
            }
            TxState::SendingCrcLo => {
                self.state = TxState::SendingCrcHi;
                Ok(LinkOutput::Byte((self.crc & 0xFF) as u8))
            }
            TxState::SendingCrcHi => {
                self.state = TxState::Idle;
                Ok(LinkOutput::Byte((self.crc >> 8) as u8))
            }
        }
    }

    fn check_enq(&mut self, now_ms: u64) -> Result<LinkOutput, HangUp> {
        let Some(last_etx) = self.last_etx else {
            return Ok(LinkOutput::NoData);
        };
        if now_ms.saturating_sub(last_etx) <= ENQ_PERIOD_MS {
            return Ok(LinkOutput::NoData);
        }
        if self.enq_retries_remaining == 0 {
            return Err(HangUp::EnqRetriesExhausted);
        }
        self.enq_retries_remaining -= 1;
        self.last_etx = Some(now_ms);
        Ok(LinkOutput::Byte(ENQ))
    }
}
