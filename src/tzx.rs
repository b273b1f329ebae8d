/*! TZX v1.20 container writer.

TZX encodes tape signals as T-state-accurate pulse descriptions. This
writer appends the block kinds the TI-99 encoder needs — pure tone (0x12),
pulse sequence (0x13), pause (0x20), and generalized data (0x19) — to any
byte sink, framing them with the magic header and little-endian fields the
format requires.

Reference: <https://worldofspectrum.net/TZXformat.html>
*/

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::trace;

use crate::{Error, Result};

/// TZX magic plus version 1.20.
const HEADER: [u8; 10] = [b'Z', b'X', b'T', b'a', b'p', b'e', b'!', 0x1a, 1, 20];

const BLOCK_PURE_TONE: u8 = 0x12;
const BLOCK_PULSE_SEQUENCE: u8 = 0x13;
const BLOCK_GENERALIZED_DATA: u8 = 0x19;
const BLOCK_PAUSE: u8 = 0x20;

/// A pulse-sequence block holds at most this many pulses; longer runs are
/// split across consecutive blocks.
const MAX_PULSES_PER_SEQUENCE: usize = 255;

/// One symbol of a generalized data block: a flags byte and up to 255
/// pulse lengths.
#[derive(Clone, Debug)]
pub struct SymbolDefinition {
    flags: u8,
    pulse_lengths: Vec<u16>,
}

impl SymbolDefinition {
    /// Create a symbol definition.
    #[must_use]
    pub fn new(flags: u8, pulse_lengths: Vec<u16>) -> Self {
        Self {
            flags,
            pulse_lengths,
        }
    }
}

/// One run-length entry of a generalized data block's pilot section.
#[derive(Clone, Copy, Debug)]
pub struct PilotRun {
    symbol: u8,
    repetitions: u16,
}

impl PilotRun {
    /// Repeat pilot symbol `symbol` `repetitions` times.
    #[must_use]
    pub fn new(symbol: u8, repetitions: u16) -> Self {
        Self {
            symbol,
            repetitions,
        }
    }
}

/// A validated TZX generalized data block (0x19).
///
/// The pilot section is run-length encoded over the pilot symbol table;
/// the data section packs `data_size` symbol indices,
/// `ceil(log2(number of data symbols))` bits each, MSB first.
#[derive(Clone, Debug)]
pub struct GeneralizedDataBlock {
    pause_after: u16,
    pilot_symbols: Vec<SymbolDefinition>,
    pilot_data: Vec<PilotRun>,
    pilot_symbol_pulses: u8,
    data_symbols: Vec<SymbolDefinition>,
    data_symbol_pulses: u8,
    data_size: u32,
    data: Vec<u8>,
    block_length: u32,
}

impl GeneralizedDataBlock {
    /// Validate and assemble a generalized data block.
    ///
    /// `data_size` counts symbols, not bytes; `data` must hold exactly the
    /// packed symbol stream.
    pub fn new(
        pause_after: u16,
        pilot_symbols: Vec<SymbolDefinition>,
        pilot_data: Vec<PilotRun>,
        data_symbols: Vec<SymbolDefinition>,
        data_size: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        let mut block = Self {
            pause_after,
            pilot_symbols: Vec::new(),
            pilot_data: Vec::new(),
            pilot_symbol_pulses: 0,
            data_symbols: Vec::new(),
            data_symbol_pulses: 0,
            data_size,
            data: Vec::new(),
            block_length: 0,
        };

        if !pilot_data.is_empty() {
            if pilot_symbols.len() > 256 {
                return Err(Error::Encoding("too many pilot symbols".into()));
            }
            block.pilot_symbol_pulses = max_pulses(&pilot_symbols)?;
            block.pilot_symbols = pilot_symbols;
            block.pilot_data = pilot_data;
        }
        if data_size > 0 {
            let bits_per_symbol = number_of_bits(data_symbols.len());
            if bits_per_symbol > 8 {
                return Err(Error::Encoding("too many data symbols".into()));
            }
            let data_bytes = (bits_per_symbol * data_size as usize).div_ceil(8);
            if data.len() < data_bytes {
                return Err(Error::Encoding("too little data".into()));
            }
            if data.len() > data_bytes {
                return Err(Error::Encoding("too much data".into()));
            }
            block.data_symbol_pulses = max_pulses(&data_symbols)?;
            block.data_symbols = data_symbols;
            block.data = data;
        }

        block.block_length = block.compute_length()?;
        Ok(block)
    }

    /// Byte count of everything following the block-length field itself.
    fn compute_length(&self) -> Result<u32> {
        let length = 14
            + self.pilot_symbols.len() * (1 + usize::from(self.pilot_symbol_pulses) * 2)
            + self.data_symbols.len() * (1 + usize::from(self.data_symbol_pulses) * 2)
            + self.pilot_data.len() * 3
            + self.data.len();
        u32::try_from(length).map_err(|_| Error::Encoding("block too long".into()))
    }
}

/// Largest pulse count over a symbol table; short symbols are zero-padded
/// to this width on disk.
fn max_pulses(symbols: &[SymbolDefinition]) -> Result<u8> {
    let mut pulses = 0;
    for symbol in symbols {
        if symbol.pulse_lengths.len() > 255 {
            return Err(Error::Encoding("too many pulses in symbol".into()));
        }
        pulses = pulses.max(symbol.pulse_lengths.len() as u8);
    }
    Ok(pulses)
}

/// Bits needed to index `value` symbols, `ceil(log2(value))`.
fn number_of_bits(value: usize) -> usize {
    let mut i = 0;
    while value > (1 << i) {
        i += 1;
    }
    i
}

/// Appends TZX blocks to a byte sink.
///
/// The magic header is written at construction, so even an output that
/// never receives a block is a valid, empty TZX file.
pub struct TzxWriter<W: Write> {
    file: W,
}

impl TzxWriter<BufWriter<File>> {
    /// Create a TZX file on disk, truncating any previous content.
    pub fn create<P: AsRef<Path>>(filename: P) -> Result<Self> {
        Self::new(BufWriter::new(File::create(filename)?))
    }
}

impl<W: Write> TzxWriter<W> {
    /// Wrap a sink and write the TZX header to it.
    pub fn new(file: W) -> Result<Self> {
        let mut writer = Self { file };
        writer.file.write_all(&HEADER)?;
        Ok(writer)
    }

    /// Append a pure tone block: `repetitions` pulses of `pulse_length`
    /// T-states each.
    pub fn add_pure_tone(&mut self, pulse_length: u16, repetitions: u16) -> Result<()> {
        trace!("tzx: pure tone {pulse_length} x{repetitions}");
        self.write_u8(BLOCK_PURE_TONE)?;
        self.write_u16(pulse_length)?;
        self.write_u16(repetitions)?;
        Ok(())
    }

    /// Append a run of arbitrary pulses, splitting into as many
    /// pulse-sequence blocks as needed.
    pub fn add_pulse_sequence(&mut self, pulses: &[u16]) -> Result<()> {
        trace!("tzx: pulse sequence, {} pulses", pulses.len());
        for chunk in pulses.chunks(MAX_PULSES_PER_SEQUENCE) {
            self.write_u8(BLOCK_PULSE_SEQUENCE)?;
            self.write_u8(chunk.len() as u8)?;
            for &pulse in chunk {
                self.write_u16(pulse)?;
            }
        }
        Ok(())
    }

    /// Append a pause (silence) block of `duration_ms` milliseconds.
    pub fn add_pause(&mut self, duration_ms: u16) -> Result<()> {
        trace!("tzx: pause {duration_ms} ms");
        self.write_u8(BLOCK_PAUSE)?;
        self.write_u16(duration_ms)?;
        Ok(())
    }

    /// Append a generalized data block.
    pub fn add_generalized_data(&mut self, block: &GeneralizedDataBlock) -> Result<()> {
        trace!(
            "tzx: generalized data, {} symbols in {} bytes",
            block.data_size,
            block.data.len()
        );
        self.write_u8(BLOCK_GENERALIZED_DATA)?;
        self.write_u32(block.block_length)?;
        self.write_u16(block.pause_after)?;
        // Pilot RLE entry count. TZX 1.20 reads this field as the total
        // pilot symbol count; with one run per symbol the two coincide.
        self.write_u32(block.pilot_data.len() as u32)?;
        self.write_u8(block.pilot_symbol_pulses)?;
        self.write_u8(block.pilot_symbols.len() as u8)?;
        self.write_u32(block.data_size)?;
        self.write_u8(block.data_symbol_pulses)?;
        self.write_u8(block.data_symbols.len() as u8)?;
        self.write_symbol_definitions(block.pilot_symbol_pulses, &block.pilot_symbols)?;
        for entry in &block.pilot_data {
            self.write_u8(entry.symbol)?;
            self.write_u16(entry.repetitions)?;
        }
        self.write_symbol_definitions(block.data_symbol_pulses, &block.data_symbols)?;
        self.file.write_all(&block.data)?;
        Ok(())
    }

    /// Flush buffered output to the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.file.flush()?;
        Ok(self.file)
    }

    fn write_symbol_definitions(
        &mut self,
        number_of_pulses: u8,
        symbols: &[SymbolDefinition],
    ) -> Result<()> {
        for symbol in symbols {
            self.write_u8(symbol.flags)?;
            for i in 0..usize::from(number_of_pulses) {
                self.write_u16(symbol.pulse_lengths.get(i).copied().unwrap_or(0))?;
            }
        }
        Ok(())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.file.write_all(&[value])?)
    }

    fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.file.write_all(&value.to_le_bytes())?)
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.file.write_all(&value.to_le_bytes())?)
    }
}
