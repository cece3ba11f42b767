use std::io;

/// Source of 12 kHz signed 16-bit mono PCM samples from the telephony host.
/// `Ok(None)` signals a clean end of stream.
pub trait HostAudioSource {
    fn next_sample(&mut self) -> io::Result<Option<i16>>;
}

/// Sink for 12 kHz signed 16-bit mono PCM samples back to the telephony host.
pub trait HostAudioSink {
    fn put_sample(&mut self, sample: i16) -> io::Result<()>;
}

/// In-memory source/sink pair, mainly useful for tests and the CLI demo tool.
pub struct MemoryAudio {
    input: std::vec::IntoIter<i16>,
    pub output: Vec<i16>,
}

impl MemoryAudio {
    pub fn new(input: Vec<i16>) -> Self {
        Self {
            input: input.into_iter(),
            output: Vec::new(),
        }
    }
}

impl HostAudioSource for MemoryAudio {
    fn next_sample(&mut self) -> io::Result<Option<i16>> {
        Ok(self.input.next())
    }
}

impl HostAudioSink for MemoryAudio {
    fn put_sample(&mut self, sample: i16) -> io::Result<()> {
        self.output.push(sample);
        Ok(())
    }
}
