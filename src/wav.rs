/*! WAV capture loading.

Reads a RIFF/WAVE byte image into the mono PCM16 form the pulse tracker
wants: uncompressed PCM only, 8- or 16-bit samples, one or two channels.
Stereo captures pick a channel (or average both) via [`Mixdown`]; 8-bit
samples are rescaled to the full 16-bit range. The largest absolute
sample value is tracked while loading, since the pulse tracker derives
its noise cutoff from it.
*/

use log::debug;

use crate::buffer::Buffer;
use crate::{Error, Result};

/// How to fold a stereo capture down to one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mixdown {
    /// Use the left channel.
    Left,
    /// Use the right channel.
    Right,
    /// Average both channels.
    Both,
}

/// A loaded mono PCM capture.
pub struct Wav {
    /// Samples per second.
    pub sample_rate: u32,
    /// Mono PCM16 samples.
    pub samples: Vec<i16>,
    /// Largest absolute sample value seen while loading.
    pub peak: u16,
}

impl Wav {
    /// Parse a WAV image from memory.
    pub fn parse(data: &[u8], mixdown: Mixdown) -> Result<Self> {
        let mut buffer = Buffer::new(data);

        if buffer.get_bytes(4)? != b"RIFF" {
            return Err(Error::Parse("not a WAV file".into()));
        }
        let size = buffer.get_u32()? as usize;
        if buffer.get_bytes(4)? != b"WAVE" {
            return Err(Error::Parse("not a WAV file".into()));
        }
        let mut chunks = buffer.sub_buffer(size.saturating_sub(4))?;

        let mut channels: u16 = 0;
        let mut sample_size: u16 = 0; // bytes per sample
        let mut sample_rate: u32 = 0;
        let mut samples = Vec::new();
        let mut peak: u16 = 0;

        while !chunks.at_end() {
            let id = chunks.get_bytes(4)?;
            let chunk_size = chunks.get_u32()? as usize;
            let mut chunk = chunks.sub_buffer(chunk_size)?;

            match id {
                b"fmt " => {
                    if chunk.get_u16()? != 1 {
                        return Err(Error::Parse("not a PCM WAV file".into()));
                    }
                    channels = chunk.get_u16()?;
                    sample_rate = chunk.get_u32()?;
                    chunk.skip(6)?; // byte rate and block align
                    let bits = chunk.get_u16()?;
                    if bits != 8 && bits != 16 {
                        return Err(Error::Parse("unsupported sample size".into()));
                    }
                    sample_size = bits / 8;
                    if channels != 1 && channels != 2 {
                        return Err(Error::Parse("unsupported number of channels".into()));
                    }
                }
                b"data" => {
                    if channels == 0 {
                        return Err(Error::Parse("missing fmt chunk".into()));
                    }
                    let mixdown = if channels == 1 { Mixdown::Left } else { mixdown };
                    let frame = usize::from(channels) * usize::from(sample_size);
                    let num_samples = chunk_size / frame;
                    samples = Vec::with_capacity(num_samples);

                    for _ in 0..num_samples {
                        let sample = match mixdown {
                            Mixdown::Left => {
                                let s = read_sample(&mut chunk, sample_size)?;
                                if channels == 2 {
                                    chunk.skip(usize::from(sample_size))?;
                                }
                                s
                            }
                            Mixdown::Right => {
                                if channels == 2 {
                                    chunk.skip(usize::from(sample_size))?;
                                }
                                read_sample(&mut chunk, sample_size)?
                            }
                            Mixdown::Both => {
                                let a = i32::from(read_sample(&mut chunk, sample_size)?);
                                let b = i32::from(read_sample(&mut chunk, sample_size)?);
                                ((a + b) / 2) as i16
                            }
                        };
                        peak = peak.max(sample.unsigned_abs());
                        samples.push(sample);
                    }
                }
                other => {
                    debug!(
                        "skipping {} chunk ({chunk_size} bytes)",
                        String::from_utf8_lossy(other)
                    );
                }
            }
        }

        if sample_rate == 0 {
            return Err(Error::Parse("missing fmt chunk".into()));
        }
        debug!(
            "loaded {} samples at {sample_rate} Hz, peak {peak}",
            samples.len()
        );
        Ok(Self {
            sample_rate,
            samples,
            peak,
        })
    }

    /// Read a WAV file from disk.
    pub fn open<P: AsRef<std::path::Path>>(path: P, mixdown: Mixdown) -> Result<Self> {
        Self::parse(&std::fs::read(path)?, mixdown)
    }
}

/// One sample, upscaled to i16 if the capture is 8-bit.
fn read_sample(chunk: &mut Buffer<'_>, sample_size: u16) -> Result<i16> {
    Ok(match sample_size {
        1 => (i32::from(chunk.get_u8()?) * 0x101 - 0x8000) as i16,
        _ => chunk.get_i16()?,
    })
}
