use amft::output::{EntryWriter, OutputFormat};
use amft::source::frontier;
use amft::{LocatedEntry, MftFile, SourceFile};
use clap::{Arg, ArgAction, Command, value_parser};
use clap_num::maybe_hex;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Entries decoded per parallel batch.
const BATCH_ENTRIES: u64 = 4096;

fn main() -> ExitCode {
    let matches = Command::new("amft")
        .version("0.1.0")
        .author("ForensicXlab")
        .about("Decode the entries of NTFS $MFT files.")
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append)
                .required(true)
                .help("A $MFT file, or a directory whose files are all $MFT files. Repeatable."),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["json", "csv", "body", "table"])
                .default_value("json")
                .help("Output format."),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_parser(value_parser!(PathBuf))
                .help("Write output to this file instead of stdout."),
        )
        .arg(
            Arg::new("sep")
                .long("sep")
                .default_value(",")
                .help("CSV field separator."),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .action(ArgAction::SetTrue)
                .help("Indent JSON output."),
        )
        .arg(
            Arg::new("entry")
                .short('e')
                .long("entry")
                .value_parser(maybe_hex::<u64>)
                .help("Only decode this entry index (decimal or hex)."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
        .arg(
            Arg::new("log_file")
                .long("log-file")
                .value_parser(value_parser!(PathBuf))
                .help("Write log output to this file instead of stderr."),
        )
        .get_matches();

    // Initialize logger.
    let log_level_str = matches
        .get_one::<String>("log_level")
        .map(String::as_str)
        .unwrap_or("info");
    let level_filter = match log_level_str {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    let mut logger = env_logger::Builder::new();
    logger.filter_level(level_filter);
    if let Some(log_file) = matches.get_one::<PathBuf>("log_file") {
        match File::create(log_file) {
            Ok(f) => {
                logger.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", log_file.display(), e),
        }
    }
    logger.init();

    let sources: Vec<PathBuf> = matches
        .get_many::<PathBuf>("source")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let format = matches
        .get_one::<String>("format")
        .and_then(|f| f.parse::<OutputFormat>().ok())
        .unwrap_or(OutputFormat::Json);
    let sep = matches
        .get_one::<String>("sep")
        .cloned()
        .unwrap_or_else(|| ",".to_string());
    let pretty = matches.get_flag("pretty");
    let only_entry = matches.get_one::<u64>("entry").copied();

    let out: Box<dyn Write> = match matches.get_one::<PathBuf>("target") {
        Some(target) => match File::create(target) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                error!("Cannot create {}: {}", target.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = EntryWriter::new(out, format)
        .separator(&sep)
        .pretty(pretty);

    let mut opened = 0usize;
    for path in frontier(&sources) {
        match process_source(&path, only_entry, &mut writer) {
            Ok(()) => opened += 1,
            Err(e) => error!("Failed to process {}: {}", path.display(), e),
        }
    }

    if let Err(e) = writer.flush() {
        error!("Cannot flush output: {}", e);
        return ExitCode::FAILURE;
    }
    if opened == 0 {
        error!("No input could be processed.");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn process_source<W: Write>(
    path: &Path,
    only_entry: Option<u64>,
    writer: &mut EntryWriter<W>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = Arc::new(SourceFile::from_path(path)?);
    let mut mft = MftFile::new(File::open(path)?)?;
    let count = mft.entry_count();
    info!("{}: {} entries, xxh3 {}", path.display(), count, source.hash);

    if let Some(index) = only_entry {
        let entry = mft.get_entry(index)?;
        writer.write(&LocatedEntry {
            source,
            record_index: index,
            entry,
        })?;
        return Ok(());
    }

    let mut skipped = 0u64;
    let mut first = 0u64;
    while first < count {
        for (index, decoded) in mft.decode_batch(first, BATCH_ENTRIES)? {
            match decoded {
                Ok(entry) => writer.write(&LocatedEntry {
                    source: Arc::clone(&source),
                    record_index: index,
                    entry,
                })?,
                Err(e) => {
                    debug!("Entry {} skipped: {}", index, e);
                    skipped += 1;
                }
            }
        }
        first += BATCH_ENTRIES;
    }
    if skipped > 0 {
        warn!("{}: {} entries had an unreadable header", path.display(), skipped);
    }
    Ok(())
}
