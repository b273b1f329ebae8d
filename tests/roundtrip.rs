//! End-to-end: encode bytes to TZX, replay the TZX pulses as a synthetic
//! PCM capture, and decode the capture back to the original bytes.

use ti99tape::encoder::{Mode, TapeEncoder};
use ti99tape::pulse::{PulseStream, TSTATE_RATE};
use ti99tape::{Result, TapeDecoder, TzxWriter};

const SAMPLE_RATE: u32 = 44_100;
const AMP: i16 = 12_000;

/// Encode one file's bytes into a TZX image in memory.
fn encode(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut tzx = TzxWriter::new(Vec::new())?;
    let mut encoder = TapeEncoder::new(&mut tzx, Mode::PulseSequence);
    encoder.encode(bytes)?;
    tzx.into_inner()
}

/// Expand the replayable blocks of a TZX image into pulse durations.
fn replay_pulses(image: &[u8]) -> Vec<u64> {
    assert_eq!(&image[..10], b"ZXTape!\x1a\x01\x14");
    let mut pulses = Vec::new();
    let mut pos = 10;
    while pos < image.len() {
        let u16_at =
            |at: usize| u64::from(u16::from_le_bytes([image[at], image[at + 1]]));
        match image[pos] {
            0x12 => {
                let length = u16_at(pos + 1);
                for _ in 0..u16_at(pos + 3) {
                    pulses.push(length);
                }
                pos += 5;
            }
            0x13 => {
                let n = image[pos + 1] as usize;
                for i in 0..n {
                    pulses.push(u16_at(pos + 2 + i * 2));
                }
                pos += 2 + n * 2;
            }
            0x20 => pos += 3,
            other => panic!("unexpected TZX block 0x{other:02x}"),
        }
    }
    pulses
}

/// Render pulses as a square wave, one half-cycle per pulse, plus a tail
/// so the final pulse has a closing transition.
fn synthesize(pulses: &[u64]) -> Vec<i16> {
    let mut samples = Vec::new();
    let mut level = AMP;
    for &tstates in pulses {
        let n = (tstates * u64::from(SAMPLE_RATE) + TSTATE_RATE / 2) / TSTATE_RATE;
        samples.extend(std::iter::repeat_n(level, n as usize));
        level = -level;
    }
    samples.extend(std::iter::repeat_n(level, 40));
    samples
}

fn decode(samples: Vec<i16>) -> Result<Vec<u8>> {
    let stream = PulseStream::new(samples, SAMPLE_RATE, AMP as u16);
    let mut decoder = TapeDecoder::new(stream.iter());
    Ok(decoder.decode()?)
}

#[test]
fn two_full_blocks_round_trip() -> Result<()> {
    let bytes: Vec<u8> = (0..128).map(|i| (i * 7 + 3) as u8).collect();
    let image = encode(&bytes)?;
    let decoded = decode(synthesize(&replay_pulses(&image)))?;
    assert_eq!(decoded, bytes);
    Ok(())
}

#[test]
fn partial_block_is_zero_padded() -> Result<()> {
    let bytes = vec![0xc3u8; 100];
    let image = encode(&bytes)?;
    let decoded = decode(synthesize(&replay_pulses(&image)))?;
    assert_eq!(decoded.len(), 128);
    assert_eq!(&decoded[..100], &bytes[..]);
    assert!(decoded[100..].iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn empty_file_round_trips() -> Result<()> {
    let image = encode(&[])?;
    let decoded = decode(synthesize(&replay_pulses(&image)))?;
    assert!(decoded.is_empty());
    Ok(())
}

#[test]
fn pilot_is_6144_zero_pulses() -> Result<()> {
    let image = encode(&[0x00; 64])?;
    let pulses = replay_pulses(&image);
    assert!(pulses.len() > 6144);
    assert!(pulses[..6144].iter().all(|&p| p == 2539));
    // The data mark follows: eight pairs of short pulses.
    assert_eq!(&pulses[6144..6148], &[1269, 1270, 1269, 1270]);
    Ok(())
}

#[test]
fn one_bit_pulse_pairs_sum_to_a_bit_cell() -> Result<()> {
    let image = encode(&[0xffu8; 64])?;
    let pulses = replay_pulses(&image);
    let data = &pulses[6144..];
    let mut i = 0;
    while i < data.len() {
        if data[i] == 2539 {
            i += 1;
        } else {
            assert_eq!(data[i] + data[i + 1], 2539, "pulse pair at {i}");
            i += 2;
        }
    }
    Ok(())
}

#[test]
fn tzx_file_written_to_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.tzx");
    {
        let mut tzx = TzxWriter::create(&path)?;
        let mut encoder = TapeEncoder::new(&mut tzx, Mode::GeneralizedData);
        encoder.encode(&[0x01, 0x02, 0x03])?;
        tzx.flush()?;
    }
    let written = std::fs::read(&path)?;
    assert_eq!(
        &written[..10],
        &[0x5a, 0x58, 0x54, 0x61, 0x70, 0x65, 0x21, 0x1a, 0x01, 0x14]
    );
    assert_eq!(written[10], 0x19);
    Ok(())
}
