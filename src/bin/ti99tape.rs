/*! Convert TI-99/4A tape recordings to TZX.

Takes a WAV capture of a cassette, a TI-Tape emulator image, or a raw
tape byte stream, and writes a TZX file an emulator can replay:

```text
$ ti99tape capture.wav game.tzx
$ ti99tape -v 2 --mixdown right capture.wav game.tzx
$ ti99tape --data-block game.titape game.tzx
```

The input format is detected from the file contents, the output format
from its extension. Only TZX output is supported.
*/

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};

use ti99tape::encoder::{Mode, TapeEncoder};
use ti99tape::format::FileFormat;
use ti99tape::pulse::PulseStream;
use ti99tape::wav::{Mixdown, Wav};
use ti99tape::{TapeDecoder, TzxWriter, titape};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Input file: WAV capture, TI-Tape image, or raw tape data.
    input: PathBuf,

    /// Output file; the format is inferred from its extension.
    output: PathBuf,

    #[arg(long, default_value = "ti99", help = "Target system")]
    system: String,

    #[arg(
        long = "data-block",
        help = "Emit one TZX generalized data block instead of tone and pulse blocks"
    )]
    data_block: bool,

    #[arg(
        long,
        default_value = "left",
        help = "Stereo input channel: left, right, or both"
    )]
    mixdown: String,

    #[arg(
        long = "output-format",
        help = "Override the output format inferred from the extension"
    )]
    output_format: Option<String>,

    #[arg(short = 'v', default_value = "0", help = "Verbosity level")]
    verbose: usize,
}

fn main() {
    let opt = Opt::parse();
    if let Err(e) = run(&opt) {
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("ti99tape")
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    match opt.system.as_str() {
        "ti99" | "ti99/4a" | "ti-99/4a" => (),
        other => bail!("unsupported system '{other}'"),
    }
    let mixdown = match opt.mixdown.as_str() {
        "left" => Mixdown::Left,
        "right" => Mixdown::Right,
        "both" => Mixdown::Both,
        other => bail!("unknown mixdown '{other}'"),
    };
    let mode = if opt.data_block {
        Mode::GeneralizedData
    } else {
        Mode::PulseSequence
    };

    let output_format = match &opt.output_format {
        Some(name) => FileFormat::by_name(name)?,
        None => FileFormat::by_filename(&opt.output),
    };
    if output_format != FileFormat::Tzx {
        bail!("only TZX output is supported, not {}", output_format.name());
    }

    let data = std::fs::read(&opt.input)
        .with_context(|| format!("can't read {}", opt.input.display()))?;
    let input_format = match FileFormat::by_contents(&data) {
        FileFormat::Raw => FileFormat::by_filename(&opt.input),
        format => format,
    };
    debug!("input detected as {}", input_format.name());

    let bytes = match input_format {
        FileFormat::Wav => {
            let wav = Wav::parse(&data, mixdown)?;
            info!(
                "WAV capture: {} samples at {} Hz, peak {}",
                wav.samples.len(),
                wav.sample_rate,
                wav.peak
            );
            let stream = PulseStream::from(wav);
            let mut decoder = TapeDecoder::new(stream.iter());
            decoder
                .decode()
                .context("tape signal did not decode")?
        }
        FileFormat::TiTape => titape::payload(&data)?.to_vec(),
        FileFormat::Raw => data,
        FileFormat::Tzx => bail!("reading TZX is not supported"),
        FileFormat::Unknown => bail!("unknown input format"),
    };

    let mut tzx = TzxWriter::create(&opt.output)
        .with_context(|| format!("can't create {}", opt.output.display()))?;
    let mut encoder = TapeEncoder::new(&mut tzx, mode);
    encoder.encode(&bytes)?;
    tzx.flush()?;
    info!("wrote {}", opt.output.display());
    Ok(())
}
