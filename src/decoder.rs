/*! TI-99/4A tape decoder.

Consumes a pulse stream and reconstructs the bytes the computer saved.
The decoder first hunts for the pilot tone, averaging pulse durations to
learn the nominal zero-bit cell length for this recording; everything
after that is classified against `3/4` of that length. A long pulse is a
`0` bit, a pair of short pulses a `1`.

Every block is recorded twice. Both copies are read and the first good
one wins; if both fail, the more informative failure (lower
[`DecodeError::severity`]) is reported.
*/

use std::iter::Peekable;

use log::{debug, info, trace, warn};

use crate::pulse::{Pulse, PulseKind};

/// Pulses at the very start of the pilot may still be distorted; they
/// count toward sync but not toward the duration average.
const SYNC_SKIP_BEGINNING: u64 = 10;

/// Pilot pulses required before the timing estimate is trusted.
const SYNC_MINIMUM_COUNT: u64 = 200;

/// Data bytes per tape block.
const BLOCK_PAYLOAD: usize = 64;

/// Ways a block or file can fail to decode, in ascending severity.
///
/// The order matters: when both copies of a block fail, the error with
/// the lower [`severity`](DecodeError::severity) is the one reported,
/// since it describes the copy that got furthest.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A block's checksum did not match its 64 data bytes.
    #[error("crc error in block")]
    Crc,

    /// The pulses violated the tape structure, e.g. no data mark where
    /// one had to be.
    #[error("{0}")]
    Encoding(&'static str),

    /// The stream ended at a block boundary where more was expected.
    #[error("out of data: {0}")]
    OutOfData(&'static str),

    /// The stream ended in the middle of a pulse group.
    #[error("{0}")]
    NoData(&'static str),

    /// No pilot tone was ever accepted.
    #[error("no sync found")]
    NoSync,
}

impl DecodeError {
    /// Severity ordinal; lower is more informative.
    #[must_use]
    pub fn severity(&self) -> u8 {
        match self {
            DecodeError::Crc => 1,
            DecodeError::Encoding(_) => 2,
            DecodeError::OutOfData(_) => 3,
            DecodeError::NoData(_) => 4,
            DecodeError::NoSync => 5,
        }
    }
}

/// Decodes a pulse stream into the recorded byte stream.
pub struct TapeDecoder<I: Iterator<Item = Pulse>> {
    pulses: Peekable<I>,
    zero_length: u64,
    long_pulse_threshold: u64,
    blocks_decoded: usize,
    copies_rejected: usize,
}

impl<I: Iterator<Item = Pulse>> TapeDecoder<I> {
    /// Create a decoder over a pulse stream.
    pub fn new(pulses: I) -> Self {
        Self {
            pulses: pulses.peekable(),
            zero_length: 0,
            long_pulse_threshold: 0,
            blocks_decoded: 0,
            copies_rejected: 0,
        }
    }

    /// Nominal zero-bit cell length in T-states, learned from the pilot.
    /// Zero until the pilot has been accepted.
    #[must_use]
    pub fn zero_length(&self) -> u64 {
        self.zero_length
    }

    /// Cutoff between short and long pulses, `zero_length * 3 / 4`.
    #[must_use]
    pub fn long_pulse_threshold(&self) -> u64 {
        self.long_pulse_threshold
    }

    /// Decode one file: pilot, block count, and every block.
    ///
    /// Returns the concatenated payloads of all blocks. Payloads keep the
    /// zero padding the encoder added to fill the final 64-byte block.
    pub fn decode(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.read_sync()?;

        let number_of_blocks = self.read_byte()?;
        let second_count = self.read_byte()?;
        if number_of_blocks != second_count {
            // The first value decides; a mismatch usually means one bad
            // bit this early, and the block reads will tell us more.
            warn!("block count mismatch: {number_of_blocks} vs {second_count}");
        }
        debug!("expecting {number_of_blocks} blocks");

        let mut data = Vec::with_capacity(usize::from(number_of_blocks) * BLOCK_PAYLOAD);
        for block in 0..number_of_blocks {
            let first = self.read_block();
            let second = self.read_block();
            match (first, second) {
                (Ok(good), Ok(other)) => {
                    if good != other {
                        debug!("block {block}: copies differ, keeping the first");
                    }
                    data.extend_from_slice(&good);
                }
                (Ok(good), Err(e)) => {
                    debug!("block {block}: second copy unusable: {e}");
                    self.copies_rejected += 1;
                    data.extend_from_slice(&good);
                }
                (Err(e), Ok(good)) => {
                    debug!("block {block}: first copy unusable: {e}");
                    self.copies_rejected += 1;
                    data.extend_from_slice(&good);
                }
                (Err(first_error), Err(second_error)) => {
                    return Err(if first_error.severity() <= second_error.severity() {
                        first_error
                    } else {
                        second_error
                    });
                }
            }
            self.blocks_decoded += 1;
        }

        info!(
            "decoded {} blocks ({} bytes), {} bad copies skipped",
            self.blocks_decoded,
            data.len(),
            self.copies_rejected
        );
        Ok(data)
    }

    /// Find the pilot tone, learn the bit-cell timing from it, and
    /// consume the data mark that ends it.
    fn read_sync(&mut self) -> Result<(), DecodeError> {
        let mut sync_length: u64 = 0;
        let mut sync_count: u64 = 0;

        loop {
            let Some(pulse) = self.pulses.next() else {
                return Err(DecodeError::NoSync);
            };
            match pulse.kind {
                PulseKind::Silence => {
                    // A dropout invalidates the running average; start
                    // over on whatever tone follows.
                    if sync_count > 0 {
                        warn!("silence inside pilot tone, restarting sync scan");
                    }
                    sync_length = 0;
                    sync_count = 0;
                }
                PulseKind::Positive | PulseKind::Negative => {
                    if sync_count > SYNC_MINIMUM_COUNT {
                        self.zero_length = sync_length / (sync_count - SYNC_SKIP_BEGINNING);
                        self.long_pulse_threshold = self.zero_length * 3 / 4;
                        if pulse.duration < self.long_pulse_threshold {
                            // First short pulse: the data mark has begun.
                            debug!(
                                "pilot accepted after {sync_count} pulses: zero length {}, threshold {}",
                                self.zero_length, self.long_pulse_threshold
                            );
                            self.read_data_mark()?;
                            return Ok(());
                        }
                    }
                    if sync_count >= SYNC_SKIP_BEGINNING {
                        sync_length += pulse.duration;
                    }
                    sync_count += 1;
                }
            }
        }
    }

    /// Scan for the inter-block sync run and consume its data mark.
    ///
    /// Block sync is eight 0x00 bytes, 64 long pulses; up to eight of
    /// them may have been eaten by a misread of the previous block's
    /// tail, so anything beyond 56 counts.
    fn read_block_sync(&mut self) -> Result<(), DecodeError> {
        let mut count = 0u32;

        loop {
            let Some(pulse) = self.pulses.next() else {
                return Err(DecodeError::OutOfData("end of pulses in block sync"));
            };
            if !pulse.is_signal() {
                return Err(DecodeError::NoData("end of data in block sync"));
            }

            if pulse.duration < self.long_pulse_threshold {
                if count > 56 {
                    match self.read_data_mark() {
                        Ok(()) => return Ok(()),
                        // A stray short pulse inside the sync run; keep
                        // scanning.
                        Err(e) => trace!("speculative data mark failed: {e}"),
                    }
                }
                count = 0;
            } else {
                count += 1;
            }
        }
    }

    /// Consume the remainder of the 0xff data mark: 16 short pulses, the
    /// first of which was already read to detect the end of sync.
    fn read_data_mark(&mut self) -> Result<(), DecodeError> {
        for _ in 0..15 {
            let Some(pulse) = self.pulses.next() else {
                return Err(DecodeError::NoData("missing pulse in data mark"));
            };
            if !pulse.is_signal() {
                return Err(DecodeError::NoData("missing pulse in data mark"));
            }
            if pulse.duration >= self.long_pulse_threshold {
                return Err(DecodeError::Encoding("missing data mark"));
            }
        }
        Ok(())
    }

    /// Read one bit: a long pulse is `0`, two short pulses are `1`.
    fn read_bit(&mut self) -> Result<u8, DecodeError> {
        let Some(pulse) = self.pulses.next() else {
            return Err(DecodeError::NoData("no pulse found"));
        };
        if !pulse.is_signal() {
            return Err(DecodeError::NoData("no pulse found"));
        }
        if pulse.duration >= self.long_pulse_threshold {
            return Ok(0);
        }
        match self.pulses.peek() {
            Some(next) if next.duration < self.long_pulse_threshold => {
                self.pulses.next();
                Ok(1)
            }
            Some(_) => Err(DecodeError::NoData("lone short pulse")),
            None => Err(DecodeError::NoData("no pulse found")),
        }
    }

    /// Read one byte, most significant bit first.
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()?;
        }
        Ok(byte)
    }

    /// Read one block: sync, data mark, 64 payload bytes, checksum.
    fn read_block(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.read_block_sync()?;

        let mut data = Vec::with_capacity(BLOCK_PAYLOAD);
        let mut checksum: u8 = 0;
        for _ in 0..BLOCK_PAYLOAD {
            let byte = self.read_byte()?;
            data.push(byte);
            checksum = checksum.wrapping_add(byte);
        }

        if self.read_byte()? != checksum {
            return Err(DecodeError::Crc);
        }
        Ok(data)
    }
}
