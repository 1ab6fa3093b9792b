use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use emu::bus::MemoryRegion;
use emu::config::EmulatorConfig;
use emu::cpu::hardware::lcd::{Color, LCD_HEIGHT, LCD_WIDTH};
use emu::disk::FileDisk;
use emu::emulator::Emulator;

const DEFAULT_FRAMES: u64 = 60;

const USAGE: &str = "\
usage: pomelo <firmware> [options]

  --config <file>            JSON emulator configuration
  --disk <image>             attach a raw disk image to the ATA controller
  --load-offset <n>          SDRAM offset for the firmware (default 0)
  --frames <n>               frames to run (default 60)
  --gdb <port>               start the remote debug stub, halted
  --dump-framebuffer <file>  write the last frame as PPM
  --stats                    print counters as JSON on exit
  --log-file <dir>           also log to <dir>/pomelo.log";

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    firmware: PathBuf,
    config: Option<PathBuf>,
    disk: Option<PathBuf>,
    load_offset: usize,
    frames: u64,
    gdb_port: Option<u16>,
    dump_framebuffer: Option<PathBuf>,
    stats: bool,
    log_dir: Option<PathBuf>,
}

fn parse_number(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number `{text}`"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options> {
    let mut options = Options {
        frames: DEFAULT_FRAMES,
        ..Options::default()
    };
    let mut firmware = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} needs a value"))
        };
        match arg.as_str() {
            "--config" => options.config = Some(value("--config")?.into()),
            "--disk" => options.disk = Some(value("--disk")?.into()),
            "--load-offset" => {
                options.load_offset = usize::try_from(parse_number(&value("--load-offset")?)?)?;
            }
            "--frames" => options.frames = parse_number(&value("--frames")?)?,
            "--gdb" => options.gdb_port = Some(u16::try_from(parse_number(&value("--gdb")?)?)?),
            "--dump-framebuffer" => {
                options.dump_framebuffer = Some(value("--dump-framebuffer")?.into());
            }
            "--stats" => options.stats = true,
            "--log-file" => options.log_dir = Some(value("--log-file")?.into()),
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option `{flag}`\n\n{USAGE}"),
            path => {
                if firmware.replace(PathBuf::from(path)).is_some() {
                    bail!("more than one firmware image given\n\n{USAGE}");
                }
            }
        }
    }

    options.firmware = firmware.with_context(|| format!("no firmware image given\n\n{USAGE}"))?;
    Ok(options)
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "pomelo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn write_ppm(out: &mut impl Write, framebuffer: &[Color]) -> std::io::Result<()> {
    write!(out, "P6\n{LCD_WIDTH} {LCD_HEIGHT}\n255\n")?;
    for pixel in framebuffer {
        out.write_all(&pixel.to_rgb888())?;
    }
    out.flush()
}

fn run(options: &Options) -> Result<()> {
    let config = match &options.config {
        Some(path) => EmulatorConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EmulatorConfig::default(),
    };
    let mut emulator = Emulator::new(config)?;

    let firmware = std::fs::read(&options.firmware)
        .with_context(|| format!("reading firmware {}", options.firmware.display()))?;
    emulator.load_at_offset(MemoryRegion::Sdram, options.load_offset, &firmware)?;
    tracing::info!("loaded {} ({} bytes)", options.firmware.display(), firmware.len());

    if let Some(path) = &options.disk {
        let disk = FileDisk::open(path).with_context(|| format!("opening disk {}", path.display()))?;
        emulator.attach_disk_backend(Box::new(disk));
    }

    if let Some(port) = options.gdb_port {
        let bound = emulator.enable_debug(port)?;
        tracing::info!("waiting for gdb on 127.0.0.1:{bound}");
    }

    for _ in 0..options.frames {
        emulator.run_frame();
    }
    tracing::info!(
        "ran {} frames, {} cycles",
        options.frames,
        emulator.total_cycles()
    );

    if let Some(path) = &options.dump_framebuffer {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_ppm(&mut BufWriter::new(file), emulator.framebuffer())?;
    }

    if options.stats {
        println!("{}", serde_json::to_string_pretty(&emulator.stats())?);
    }

    Ok(())
}

fn main() -> Result<()> {
    let options = parse_args(std::env::args().skip(1))?;
    let _guard = init_logging(options.log_dir.as_deref());

    run(&options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parses_all_flags() {
        let options = parse_args(args(
            "fw.bin --disk hd.img --load-offset 0x8000 --frames 3 --gdb 2345 --stats",
        ))
        .unwrap();

        assert_eq!(
            options,
            Options {
                firmware: "fw.bin".into(),
                disk: Some("hd.img".into()),
                load_offset: 0x8000,
                frames: 3,
                gdb_port: Some(2345),
                stats: true,
                ..Options::default()
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args("--frames 3")).is_err());
        assert!(parse_args(args("fw.bin --frames")).is_err());
        assert!(parse_args(args("fw.bin --bogus")).is_err());
        assert!(parse_args(args("fw.bin --gdb 70000")).is_err());
        assert!(parse_args(args("a.bin b.bin")).is_err());
    }

    #[test]
    fn ppm_header_and_pixels() {
        let mut out = Vec::new();

        write_ppm(&mut out, &[Color(0xF800), Color(0x001F)]).unwrap();

        let header = format!("P6\n{LCD_WIDTH} {LCD_HEIGHT}\n255\n");
        assert_eq!(&out[..header.len()], header.as_bytes());
        assert_eq!(&out[header.len()..], &[0xFF, 0, 0, 0, 0, 0xFF]);
    }
}
