use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use btx_session::host::{HostAudioSink, HostAudioSource};

pub struct WavSource {
    samples: std::vec::IntoIter<i16>,
}

impl WavSource {
    pub fn open(path: &Path) -> hound::Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        Ok(Self {
            samples: samples.into_iter(),
        })
    }
}

impl HostAudioSource for WavSource {
    fn next_sample(&mut self) -> io::Result<Option<i16>> {
        Ok(self.samples.next())
    }
}

pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavSink {
    pub fn create(path: &Path) -> hound::Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 12_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
        })
    }
}

impl HostAudioSink for WavSink {
    fn put_sample(&mut self, sample: i16) -> io::Result<()> {
        self.writer
            .write_sample(sample)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
