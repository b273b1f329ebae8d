/*! TI-99/4A tape encoder.

Packs a byte stream into the block structure the TI-99/4A writes to
cassette and appends the result to a [`TzxWriter`]. Each file becomes:

```text
0xff · N · N · (block · block) x N
```

where every logical block is recorded twice and laid out as eight 0x00
sync bytes, one 0xff data mark, 64 data bytes (zero-padded), and a mod-256
checksum. A `0` bit is a single pulse of [`ZERO_PULSE_LENGTH`] T-states; a
`1` bit is two pulses summing to the same length. The whole file is
preceded by a pilot tone of [`NUMBER_OF_SYNC_PULSES`] zero-bit pulses.
*/

use std::io::Write;

use log::debug;

use crate::tzx::{GeneralizedDataBlock, PilotRun, SymbolDefinition, TzxWriter};
use crate::{Error, Result};

/// Duration of a `0` bit cell in T-states.
pub const ZERO_PULSE_LENGTH: u16 = 2539;

/// Pilot tone length: 768 zero bytes of eight bits each.
pub const NUMBER_OF_SYNC_PULSES: u16 = 768 * 8;

/// First and second pulse of a `1` bit; together they span one bit cell.
const ONE_PULSE_FIRST: u16 = ZERO_PULSE_LENGTH / 2;
const ONE_PULSE_SECOND: u16 = ZERO_PULSE_LENGTH - ZERO_PULSE_LENGTH / 2;

/// Data bytes per tape block.
const BLOCK_PAYLOAD: usize = 64;

/// The block count is a single byte on tape.
const MAX_BLOCKS: usize = 255;

/// Silence between consecutive files on the same tape, in milliseconds.
const INTER_FILE_GAP_MS: u16 = 1000;

/// How the encoded signal is expressed in the TZX output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// A pure-tone block for the pilot, then the data bits expanded into
    /// pulse-sequence blocks.
    PulseSequence,
    /// One generalized data block carrying pilot and data as symbol
    /// tables.
    GeneralizedData,
}

/// Encodes byte streams onto a TZX writer, one file per [`encode`] call.
///
/// [`encode`]: TapeEncoder::encode
pub struct TapeEncoder<'a, W: Write> {
    tzx: &'a mut TzxWriter<W>,
    mode: Mode,
    first: bool,
    data: Vec<u8>,
    pulses: Vec<u16>,
}

impl<'a, W: Write> TapeEncoder<'a, W> {
    /// Create an encoder appending to `tzx`.
    pub fn new(tzx: &'a mut TzxWriter<W>, mode: Mode) -> Self {
        Self {
            tzx,
            mode,
            first: true,
            data: Vec::new(),
            pulses: Vec::new(),
        }
    }

    /// Encode one file and append it to the TZX output.
    ///
    /// Inputs longer than 64 bytes span multiple blocks; the last block is
    /// zero-padded. At most `255 * 64` bytes fit in one file. A second
    /// call writes a separate file after an inter-file gap.
    pub fn encode(&mut self, bytes: &[u8]) -> Result<()> {
        let num_blocks = bytes.len().div_ceil(BLOCK_PAYLOAD);
        if num_blocks > MAX_BLOCKS {
            return Err(Error::Encoding("file too long".into()));
        }

        if !self.first {
            self.tzx.add_pause(INTER_FILE_GAP_MS)?;
        }

        self.add_byte(0xff);
        self.add_byte(num_blocks as u8);
        self.add_byte(num_blocks as u8);

        for chunk in bytes.chunks(BLOCK_PAYLOAD) {
            self.add_block(chunk);
            self.add_block(chunk);
        }
        debug!(
            "encoded {} bytes as {num_blocks} duplicated blocks",
            bytes.len()
        );

        match self.mode {
            Mode::GeneralizedData => {
                let data = std::mem::take(&mut self.data);
                let data_size = data.len() as u32 * 8;
                let block = GeneralizedDataBlock::new(
                    0,
                    pilot_symbols(),
                    pilot_data(),
                    data_symbols(),
                    data_size,
                    data,
                )?;
                self.tzx.add_generalized_data(&block)?;
            }
            Mode::PulseSequence => {
                self.tzx
                    .add_pure_tone(ZERO_PULSE_LENGTH, NUMBER_OF_SYNC_PULSES)?;
                let pulses = std::mem::take(&mut self.pulses);
                self.tzx.add_pulse_sequence(&pulses)?;
            }
        }
        self.first = false;
        Ok(())
    }

    /// One tape block: sync, data mark, 64 payload bytes, checksum.
    fn add_block(&mut self, payload: &[u8]) {
        for _ in 0..8 {
            self.add_byte(0);
        }
        self.add_byte(0xff);
        let mut checksum: u8 = 0;
        for i in 0..BLOCK_PAYLOAD {
            let byte = payload.get(i).copied().unwrap_or(0);
            self.add_byte(byte);
            checksum = checksum.wrapping_add(byte);
        }
        self.add_byte(checksum);
    }

    fn add_byte(&mut self, byte: u8) {
        match self.mode {
            Mode::GeneralizedData => self.data.push(byte),
            Mode::PulseSequence => {
                for i in 0..8 {
                    if byte & (0x80 >> i) != 0 {
                        self.pulses.push(ONE_PULSE_FIRST);
                        self.pulses.push(ONE_PULSE_SECOND);
                    } else {
                        self.pulses.push(ZERO_PULSE_LENGTH);
                    }
                }
            }
        }
    }
}

/// Pilot section: one symbol, a single zero-length pulse.
fn pilot_symbols() -> Vec<SymbolDefinition> {
    vec![SymbolDefinition::new(0, vec![ZERO_PULSE_LENGTH])]
}

fn pilot_data() -> Vec<PilotRun> {
    vec![PilotRun::new(0, NUMBER_OF_SYNC_PULSES)]
}

/// Data section: symbol 0 is a `0` bit, symbol 1 the two pulses of a `1`.
fn data_symbols() -> Vec<SymbolDefinition> {
    vec![
        SymbolDefinition::new(0, vec![ZERO_PULSE_LENGTH]),
        SymbolDefinition::new(0, vec![ONE_PULSE_FIRST, ONE_PULSE_SECOND]),
    ]
}
