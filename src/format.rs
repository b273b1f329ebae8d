/*! File format identification.

Formats are detected by content signature where possible and by file
extension otherwise. The tables live here as module data with process
lifetime.
*/

use std::path::Path;

use crate::{Error, Result};

/// File formats this tool knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    /// TI-Tape emulator image.
    TiTape,
    /// TZX tape image.
    Tzx,
    /// Raw tape byte stream.
    Raw,
    /// WAV audio capture.
    Wav,
    /// Not recognized.
    Unknown,
}

/// A magic byte sequence at a fixed offset. Negative offsets count back
/// from the end of the file.
struct Signature {
    offset: i64,
    magic: &'static [u8],
    format: FileFormat,
}

impl Signature {
    fn matches(&self, data: &[u8]) -> bool {
        let start = if self.offset >= 0 {
            self.offset as usize
        } else {
            let back = self.offset.unsigned_abs() as usize;
            if back > data.len() {
                return false;
            }
            data.len() - back
        };
        data.get(start..start + self.magic.len()) == Some(self.magic)
    }
}

const SIGNATURES: &[Signature] = &[
    Signature {
        offset: 0,
        magic: b"TI-TAPE",
        format: FileFormat::TiTape,
    },
    Signature {
        offset: 0,
        magic: b"RIFF",
        format: FileFormat::Wav,
    },
    Signature {
        offset: 0,
        magic: b"ZXTape!\x1a",
        format: FileFormat::Tzx,
    },
];

impl FileFormat {
    /// Human-readable format name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::TiTape => "TI-Tape",
            FileFormat::Tzx => "TZX",
            FileFormat::Raw => "raw data",
            FileFormat::Wav => "WAV",
            FileFormat::Unknown => "unknown",
        }
    }

    /// Detect a format from file contents. Unrecognized data is raw.
    #[must_use]
    pub fn by_contents(data: &[u8]) -> FileFormat {
        SIGNATURES
            .iter()
            .find(|signature| signature.matches(data))
            .map_or(FileFormat::Raw, |signature| signature.format)
    }

    /// Detect a format from a file extension (without the dot).
    #[must_use]
    pub fn by_extension(extension: &str) -> FileFormat {
        match extension.to_ascii_lowercase().as_str() {
            "tzx" => FileFormat::Tzx,
            "wav" => FileFormat::Wav,
            _ => FileFormat::Raw,
        }
    }

    /// Detect a format from a file name.
    #[must_use]
    pub fn by_filename<P: AsRef<Path>>(filename: P) -> FileFormat {
        match filename.as_ref().extension().and_then(|e| e.to_str()) {
            Some(extension) => Self::by_extension(extension),
            None => FileFormat::Raw,
        }
    }

    /// Look up a format by its user-facing name.
    pub fn by_name(name: &str) -> Result<FileFormat> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "raw" | "raw data" => FileFormat::Raw,
            "tzx" => FileFormat::Tzx,
            "wav" => FileFormat::Wav,
            "unknown" => FileFormat::Unknown,
            _ => return Err(Error::Parse(format!("unknown format '{name}'"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_win() {
        assert_eq!(
            FileFormat::by_contents(b"TI-TAPE\0\0\0\0\0\0\0\0\0\0\0\0\0"),
            FileFormat::TiTape
        );
        assert_eq!(FileFormat::by_contents(b"RIFF1234WAVE"), FileFormat::Wav);
        assert_eq!(
            FileFormat::by_contents(b"ZXTape!\x1a\x01\x14"),
            FileFormat::Tzx
        );
        assert_eq!(FileFormat::by_contents(b"anything else"), FileFormat::Raw);
        assert_eq!(FileFormat::by_contents(b""), FileFormat::Raw);
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(FileFormat::by_extension("tzx"), FileFormat::Tzx);
        assert_eq!(FileFormat::by_extension("TZX"), FileFormat::Tzx);
        assert_eq!(FileFormat::by_extension("Wav"), FileFormat::Wav);
        assert_eq!(FileFormat::by_extension("titape"), FileFormat::Raw);
    }

    #[test]
    fn filenames() {
        assert_eq!(FileFormat::by_filename("game.tzx"), FileFormat::Tzx);
        assert_eq!(FileFormat::by_filename("dir.x/capture.WAV"), FileFormat::Wav);
        assert_eq!(FileFormat::by_filename("noextension"), FileFormat::Raw);
        assert_eq!(FileFormat::by_filename("data.bin"), FileFormat::Raw);
    }

    #[test]
    fn names_round_trip() -> Result<()> {
        for format in [FileFormat::Raw, FileFormat::Tzx, FileFormat::Wav] {
            assert_eq!(FileFormat::by_name(format.name())?, format);
        }
        assert!(FileFormat::by_name("floppy").is_err());
        Ok(())
    }

    #[test]
    fn tail_signatures_use_end_offset() {
        let tail = Signature {
            offset: -4,
            magic: b"TAIL",
            format: FileFormat::Unknown,
        };
        assert!(tail.matches(b"xxxxTAIL"));
        assert!(!tail.matches(b"TAILxxxx"));
        // Shorter than the offset reaches back: no match, no panic.
        assert!(!tail.matches(b"TAI"));
    }
}
