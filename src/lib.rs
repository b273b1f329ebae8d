#![warn(missing_docs)]
/*! Convert TI-99/4A cassette tape recordings between audio captures, TZX
images, and raw tape data.

The TI-99/4A saves programs to cassette as an audio signal: a long pilot
tone, then fixed-size data blocks where a `0` bit is one long pulse and a
`1` bit is a pair of short pulses. This crate recovers that signal from a
PCM capture, decodes it back into bytes, and re-encodes bytes into a TZX
file that emulators can replay.

# Architecture overview

Data flows through a pull-based pipeline. Each stage consumes the previous
one lazily; nothing is buffered beyond what the stage itself needs.

```text
 PCM samples ──► PulseStream ──► TapeDecoder ──► raw bytes
                                                    │
                                                    ▼
 raw bytes ─────────────────► TapeEncoder ──► TzxWriter ──► TZX bytes
```

* [`pulse::PulseStream`] segments a sampled waveform into typed pulses
  (positive half-cycle, negative half-cycle, silence) with durations
  measured in 3.5 MHz T-states.
* [`decoder::TapeDecoder`] runs the tape protocol over the pulse stream:
  pilot detection, adaptive bit-cell timing, block sync, checksums, and
  reconciliation of the two redundant copies every block carries.
* [`encoder::TapeEncoder`] packs a byte stream into tape block frames and
  hands them to a [`tzx::TzxWriter`] either as pulse sequences or as one
  TZX generalized data block.

# Example

Encode a file's worth of bytes into an in-memory TZX image:

```
use ti99tape::encoder::{Mode, TapeEncoder};
use ti99tape::tzx::TzxWriter;

let mut tzx = TzxWriter::new(Vec::new())?;
let mut encoder = TapeEncoder::new(&mut tzx, Mode::PulseSequence);
encoder.encode(&[0x42; 64])?;
# Ok::<(), ti99tape::Error>(())
```
*/

pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod pulse;
pub mod titape;
pub mod tzx;
pub mod wav;

pub use decoder::TapeDecoder;
pub use encoder::TapeEncoder;
pub use pulse::PulseStream;
pub use tzx::TzxWriter;
pub use wav::Wav;

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tape decoding failed on both copies of a block.
    #[error("decode error: {0}")]
    Decode(#[from] decoder::DecodeError),

    /// An encoder input or TZX block violated a format constraint.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An input container was malformed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
