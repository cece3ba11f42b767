use std::net::TcpStream;

use btx_core::linklayer::{LinkLayer, LinkOutput, LinkSocket};
use btx_core::modem::{BtxDemodulator, BtxModulator, DemodEvent};
use log::{info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::host::{HostAudioSink, HostAudioSource};

/// Single-threaded cooperative session driver: one demodulator, one modulator,
/// one link layer and one socket, stepped one audio sample at a time. There is
/// no background thread here and no shared state between sessions - the host
/// is expected to call `run` from whatever loop already owns the audio frame.
pub struct Session<Source, Sink, Sock> {
    demod: BtxDemodulator,
    modulator: BtxModulator,
    link: LinkLayer,
    socket: Sock,
    source: Source,
    sink: Sink,
    pending_received: Option<u8>,
    sample_count: u64,
}

impl<Source, Sink> Session<Source, Sink, TcpStream>
where
    Source: HostAudioSource,
    Sink: HostAudioSink,
{
    /// Connects to the configured peer and sets the socket non-blocking, as
    /// the link layer's socket pump requires.
    pub fn connect(config: SessionConfig, source: Source, sink: Sink) -> Result<Self, SessionError> {
        let socket = TcpStream::connect(config.peer)
            .map_err(|e| SessionError::Connect(config.peer.into(), e))?;
        socket
            .set_nonblocking(true)
            .map_err(SessionError::SocketConfig)?;
        info!("btx: connected to {}", config.peer);
        Ok(Self::new(config, socket, source, sink))
    }
}

impl<Source, Sink, Sock> Session<Source, Sink, Sock>
where
    Source: HostAudioSource,
    Sink: HostAudioSink,
    Sock: LinkSocket,
{
    pub fn new(config: SessionConfig, socket: Sock, source: Source, sink: Sink) -> Self {
        Self {
            demod: BtxDemodulator::new(),
            modulator: BtxModulator::new(),
            link: LinkLayer::new(config.link_layer, config.enq_retries),
            socket,
            source,
            sink,
            pending_received: None,
            sample_count: 0,
        }
    }

    /// Drives the session to completion: runs until the host audio source is
    /// exhausted or the link layer hangs up.
    pub fn run(&mut self) -> Result<(), SessionError> {
        while self.step()? {}
        Ok(())
    }

    /// Processes exactly one audio sample. Returns `Ok(false)` once the host
    /// source is exhausted.
    pub fn step(&mut self) -> Result<bool, SessionError> {
        let sample = match self.source.next_sample().map_err(SessionError::HostSource)? {
            Some(s) => s,
            None => return Ok(false),
        };

        if let DemodEvent::Byte(b) = self.demod.demod(sample) {
            self.pending_received = Some(b);
        }
        self.link.set_carrier_detect(self.demod.carrier_detect());

        let out_sample = self.modulator.modulate();
        self.sink.put_sample(out_sample).map_err(SessionError::HostSink)?;
        self.sample_count += 1;

        if self.modulator.ready_for_next_octet() {
            self.tick_link_layer()?;
        }

        Ok(true)
    }

    fn tick_link_layer(&mut self) -> Result<(), SessionError> {
        if let Some(byte) = self.pending_received.take() {
            self.link
                .receive_byte(byte, &mut self.socket)
                .map_err(SessionError::HungUp)?;
        }
        self.link
            .poll_socket(&mut self.socket)
            .map_err(SessionError::HungUp)?;

        let now_ms = self.sample_count / 12; // 12000 samples/s
        match self
            .link
            .next_output(now_ms)
            .map_err(SessionError::HungUp)?
        {
            LinkOutput::Byte(b) => self.modulator.transmit(b),
            LinkOutput::NoData => {}
        }
        Ok(())
    }
}

impl<Source, Sink, Sock> Drop for Session<Source, Sink, Sock> {
    fn drop(&mut self) {
        if self.link.has_retained_block() {
            warn!("btx: session ended with an unacknowledged block in flight");
        }
    }
}
