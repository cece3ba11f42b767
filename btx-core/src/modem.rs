//! Software V.23 modem: demodulates the 75 bit/s upstream tone from the terminal
//! and modulates the 1200 bit/s downstream tone back to it.
//!
//! Both directions run at a fixed 12 kHz sample rate and exchange one `i16` PCM
//! sample per call, mirroring the way the upstream modem firmware processes
//! audio: no buffering, no lookahead, state carried entirely in `self`.

use std::f64::consts::PI;

const SRATE: f64 = 12_000.0;

const FAST_BIT_LEN: i32 = 10; // samples per bit at 1200 bit/s
const SLOW_BIT_LEN: i32 = 160; // samples per bit at 75 bit/s

const SLOW_FRQ: f64 = 420.0;
const FILTER_STAGES: usize = 5;
const FILTER_ALPHA: f64 = 0.08;
const CARRIER_THRESHOLD: f64 = 100_000.0;

const FAST_FRQ_0: f64 = 2100.0; // space
const FAST_FRQ_1: f64 = 1300.0; // mark
const STABLEN: i32 = 120;

/// One full period of a sine wave at the table's reference unit (100 Hz steps
/// at 12 kHz), scaled to the firmware's fixed modulation amplitude.
const SINETAB: [i16; STABLEN as usize] = [
    0, 1046, 2090, 3128, 4158, 5176, 6180, 7167, 8134, 9079, 9999, 10892, 11755,
    12586, 13382, 14142, 14862, 15542, 16180, 16773, 17320, 17820, 18270, 18671,
    19021, 19318, 19562, 19753, 19890, 19972, 20000, 19972, 19890, 19753, 19562,
    19318, 19021, 18671, 18270, 17820, 17320, 16773, 16180, 15542, 14862, 14142,
    13382, 12586, 11755, 10892, 9999, 9079, 8134, 7167, 6180, 5176, 4158, 3128,
    2090, 1046, 0, -1046, -2090, -3128, -4158, -5176, -6180, -7167, -8134, -9079,
    -10000, -10892, -11755, -12586, -13382, -14142, -14862, -15542, -16180,
    -16773, -17320, -17820, -18270, -18671, -19021, -19318, -19562, -19753,
    -19890, -19972, -20000, -19972, -19890, -19753, -19562, -19318, -19021,
    -18671, -18270, -17820, -17320, -16773, -16180, -15542, -14862, -14142,
    -13382, -12586, -11755, -10892, -10000, -9079, -8134, -7167, -6180, -5176,
    -4158, -3128, -2090, -1046,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodEvent {
    Byte(u8),
    NoData,
    NoCarrier,
}

/// Demodulates the upstream 75 bit/s tone around 420 Hz into async 8N1 bytes.
pub struct BtxDemodulator {
    phi: f64,
    filter: [(f64, f64); FILTER_STAGES],
    iq: [(f64, f64); 3],
    avg_power: f64,
    pos: i32,
    integral: f64,
    shift: u8,
    carrier: bool,
}

impl Default for BtxDemodulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BtxDemodulator {
    pub fn new() -> Self {
        Self {
            phi: 0.0,
            filter: [(0.0, 0.0); FILTER_STAGES],
            iq: [(0.0, 0.0); 3],
            avg_power: 0.0,
            pos: -1,
            integral: 0.0,
            shift: 0,
            carrier: false,
        }
    }

    pub fn carrier_detect(&self) -> bool {
        self.carrier
    }

    pub fn demod(&mut self, sample: i16) -> DemodEvent {
        let x = sample as f64;
        let i = x * self.phi.sin();
        let q = x * self.phi.cos();
        self.phi += 2.0 * PI * SLOW_FRQ / SRATE;
        if self.phi > 2.0 * PI {
            self.phi -= 2.0 * PI;
        }

        let mut prev = (i, q);
        for stage in self.filter.iter_mut() {
            let re = stage.0 * (1.0 - FILTER_ALPHA) + prev.0 * FILTER_ALPHA;
            let im = stage.1 * (1.0 - FILTER_ALPHA) + prev.1 * FILTER_ALPHA;
            *stage = (re, im);
            prev = (re, im);
        }

        self.iq[2] = self.iq[1];
        self.iq[1] = self.iq[0];
        self.iq[0] = *self.filter.last().expect("at least one filter stage");

        let di = self.iq[0].0 - self.iq[2].0;
        let dq = self.iq[0].1 - self.iq[2].1;
        let f = self.iq[1].0 * dq - self.iq[1].1 * di;
        let p = self.iq[1].0 * self.iq[1].0 + self.iq[1].1 * self.iq[1].1;
        let frq = if p != 0.0 { -f / p } else { 0.0 };

        self.avg_power = 0.9 * self.avg_power + 0.1 * p;
        self.carrier = self.avg_power >= CARRIER_THRESHOLD;
        if !self.carrier {
            self.pos = -1;
            self.integral = 0.0;
            return DemodEvent::NoCarrier;
        }

        if self.pos < 0 {
            if frq < 0.0 {
                self.pos = 0;
                self.integral = 0.0;
            }
            return DemodEvent::NoData;
        }

        let bpos = self.pos / SLOW_BIT_LEN;
        self.integral += frq;
        self.pos += 1;
        if self.pos % SLOW_BIT_LEN != 0 {
            return DemodEvent::NoData;
        }

        let event = if bpos == 0 {
            if self.integral > 0.0 {
                // no start bit after all, go back to hunting
                self.pos = -1;
            } else {
                self.shift = 0;
            }
            DemodEvent::NoData
        } else if bpos < 9 {
            let bit = if self.integral > 0.0 { 1u8 } else { 0u8 };
            self.shift = (self.shift >> 1) | (bit << 7);
            DemodEvent::NoData
        } else {
            // stop bit
            self.pos = -1;
            if self.integral < 0.0 {
                DemodEvent::NoData
            } else {
                DemodEvent::Byte(self.shift)
            }
        };
        self.integral = 0.0;
        event
    }
}

/// Modulates async 8N1 bytes onto the downstream 1200 bit/s tone at 1300/2100 Hz.
pub struct BtxModulator {
    phase: i32,
    spos: i32,
    data: Option<u8>,
}

impl Default for BtxModulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BtxModulator {
    pub fn new() -> Self {
        Self {
            phase: 0,
            // about two seconds of continuous mark before the line is considered up
            spos: -2 * SRATE as i32,
            data: None,
        }
    }

    pub fn ready_for_next_octet(&self) -> bool {
        self.spos == -1
    }

    /// Hand the modulator the next octet to send. The caller must only do this
    /// once `ready_for_next_octet` is true.
    pub fn transmit(&mut self, byte: u8) {
        self.data = Some(byte);
        self.spos = 0;
    }

    pub fn modulate(&mut self) -> i16 {
        if self.spos < 0 {
            self.spos += 1;
            return self.tone(1);
        }

        let bpos = self.spos / FAST_BIT_LEN;
        let sample = if bpos == 0 {
            self.tone(0) // start bit
        } else if bpos < 9 {
            let bit = (self.data.unwrap_or(0) >> (bpos - 1) as u32) & 1;
            self.tone(bit)
        } else if bpos == 9 {
            self.tone(1) // stop bit
        } else {
            self.spos = -1;
            self.data = None;
            return self.tone(1);
        };
        self.spos += 1;
        sample
    }

    fn tone(&mut self, bit: u8) -> i16 {
        let step = if bit & 1 == 0 {
            (FAST_FRQ_0 / 100.0) as i32
        } else {
            (FAST_FRQ_1 / 100.0) as i32
        };
        self.phase = (self.phase + step).rem_euclid(STABLEN);
        SINETAB[self.phase as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_tone_phase_increment() {
        let mut m = BtxModulator::new();
        let first = m.modulate();
        // fresh phase 0, mark bit increments by 13
        assert_eq!(first, SINETAB[13]);
    }

    #[test]
    fn octet_framing_uses_expected_tone_per_bit() {
        let mut m = BtxModulator::new();
        m.transmit(0b1010_0101);
        // start bit: space, increments by 21
        m.phase = 0;
        m.spos = 0;
        let start = m.modulate();
        assert_eq!(start, SINETAB[21]);
    }

    #[test]
    fn ready_after_full_octet() {
        let mut m = BtxModulator::new();
        m.transmit(0x55);
        // 10 bit slots of FAST_BIT_LEN samples, plus one call for the
        // modulator to notice it has run past the stop bit and go idle.
        for _ in 0..=(FAST_BIT_LEN * 10) {
            m.modulate();
        }
        assert!(m.ready_for_next_octet());
    }

    fn synth_tone(phase: &mut f64, freq: f64, n: usize, amplitude: f64) -> Vec<i16> {
        let step = 2.0 * PI * freq / SRATE;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push((amplitude * phase.sin()) as i16);
            *phase += step;
            if *phase > 2.0 * PI {
                *phase -= 2.0 * PI;
            }
        }
        out
    }

    fn synth_byte(phase: &mut f64, byte: u8) -> Vec<i16> {
        const MARK: f64 = 450.0;
        const SPACE: f64 = 390.0;
        let mut samples = synth_tone(phase, SPACE, SLOW_BIT_LEN as usize, 16000.0);
        for i in 0..8 {
            let bit = (byte >> i) & 1;
            let f = if bit == 1 { MARK } else { SPACE };
            samples.extend(synth_tone(phase, f, SLOW_BIT_LEN as usize, 16000.0));
        }
        samples.extend(synth_tone(phase, MARK, SLOW_BIT_LEN as usize, 16000.0));
        samples
    }

    #[test]
    fn demodulator_recovers_every_byte_from_a_synthesized_tone() {
        for byte in 0u16..=255 {
            let byte = byte as u8;
            let mut demod = BtxDemodulator::new();
            let mut phase = 0.0;

            for sample in synth_tone(&mut phase, 450.0, SLOW_BIT_LEN as usize * 4, 16000.0) {
                demod.demod(sample);
            }

            let mut decoded = None;
            for sample in synth_byte(&mut phase, byte) {
                if let DemodEvent::Byte(b) = demod.demod(sample) {
                    decoded = Some(b);
                }
            }
            assert_eq!(decoded, Some(byte), "failed to recover byte {byte:#04x}");
        }
    }

    #[test]
    fn demodulator_reports_no_carrier_on_silence() {
        let mut demod = BtxDemodulator::new();
        let mut last = DemodEvent::NoData;
        for _ in 0..500 {
            last = demod.demod(0);
        }
        assert_eq!(last, DemodEvent::NoCarrier);
        assert!(!demod.carrier_detect());
    }
}
