use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use env_logger::Env;

use sio_rs::common::io::{read_file, read_stdin, split_records};
use sio_rs::common::{io_error_msg, reset_sigpipe};
use sio_rs::sio::{
    CollationTable, DisplayFlags, DisplaySink, SessionConfig, SortKey, parse_buffer_size,
    sort_records,
};

#[derive(Parser)]
#[command(
    name = "fsio",
    about = "Sort a file of fixed-length records within a memory budget"
)]
struct Cli {
    /// Record length in bytes
    #[arg(short = 'l', long = "record-length", value_name = "BYTES")]
    record_length: usize,

    /// Sort key START,END[FLAGS]: 0-based, end exclusive; flags a, d, n, p
    #[arg(short = 'k', long = "key", value_name = "KEYDEF")]
    keys: Vec<String>,

    /// Memory budget for sort buffers (suffixes K, M, G, T, b)
    #[arg(short = 'S', long = "buffer-size", value_name = "SIZE")]
    buffer_size: Option<String>,

    /// Directory for the scratch file
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Name of the scratch file
    #[arg(short = 'w', long = "work-file", value_name = "NAME")]
    work_file: Option<PathBuf>,

    /// Write result to FILE instead of standard output
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// 256-byte table of collating priorities
    #[arg(long = "collate", value_name = "FILE")]
    collate: Option<PathBuf>,

    /// Report phases on stderr; twice for details
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Input file; standard input when absent or '-'
    input: Option<PathBuf>,
}

fn display_flags(verbose: u8) -> DisplayFlags {
    match verbose {
        0 => DisplayFlags::NONE,
        1 => DisplayFlags::PHASE,
        _ => DisplayFlags::PHASE | DisplayFlags::EXTRA,
    }
}

fn stderr_sink() -> DisplaySink {
    Box::new(|text: Option<&str>| match text {
        Some(t) => eprint!("{}", t),
        None => {
            let _ = io::stderr().flush();
        }
    })
}

fn run(cli: Cli) -> Result<()> {
    let keys = cli
        .keys
        .iter()
        .map(|spec| SortKey::parse(spec).map_err(|e| anyhow!("invalid key: {}", e)))
        .collect::<Result<Vec<_>>>()?;

    let mut config = SessionConfig::new(cli.record_length, keys);
    if let Some(size) = cli.buffer_size.as_deref() {
        config.memory_budget =
            parse_buffer_size(size).map_err(|e| anyhow!("invalid buffer size: {}", e))?;
    }
    config.working_dir = cli.temp_dir;
    config.work_filename = cli.work_file;
    config.display = display_flags(cli.verbose);
    if let Some(path) = cli.collate.as_deref() {
        config.collation = Some(
            CollationTable::load(path)
                .with_context(|| format!("cannot load collation '{}'", path.display()))?,
        );
    }

    let data = match cli.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => read_file(path).map_err(|e| {
            anyhow!("cannot read '{}': {}", path.display(), io_error_msg(&e))
        })?,
        _ => read_stdin().map_err(|e| anyhow!("cannot read stdin: {}", io_error_msg(&e)))?,
    };
    let mut records = split_records(&data, cli.record_length.max(1))?;

    let out: Box<dyn Write> = match cli.output.as_deref() {
        Some(path) => Box::new(
            File::create(path)
                .map_err(|e| anyhow!("cannot create '{}': {}", path.display(), io_error_msg(&e)))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::with_capacity(256 * 1024, out);

    let sink = if cli.verbose > 0 {
        Some(stderr_sink())
    } else {
        None
    };
    let stats = sort_records(
        config,
        sink,
        |slot| match records.next() {
            Some(record) => {
                slot.copy_from_slice(record);
                Ok(true)
            }
            None => Ok(false),
        },
        |record| out.write_all(record),
    )?;
    out.flush().context("write error")?;

    log::info!(
        "sorted {} records in {} runs with {} merge passes",
        stats.records_out,
        stats.runs_written,
        stats.merge_passes
    );
    Ok(())
}

fn main() {
    reset_sigpipe();
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("fsio: {:#}", e);
        process::exit(2);
    }
}
