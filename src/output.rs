//! Line-oriented writers for decoded entries: JSON lines, CSV summary rows,
//! mactime bodyfile lines and human-readable tables.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::io::{self, Write};
use std::str::FromStr;

use crate::entry::MftEntry;
use crate::source::LocatedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Body,
    Table,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "body" => Ok(OutputFormat::Body),
            "table" => Ok(OutputFormat::Table),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

pub const CSV_FIELDS: [&str; 15] = [
    "SourceFile",
    "RecordIndex",
    "MFTRecordNumber",
    "Signature",
    "SequenceNumber",
    "LogFileSequenceNumber",
    "Active",
    "HasIndex",
    "UsedSize",
    "TotalSize",
    "ReferenceCount",
    "StandardInformationCount",
    "FileNameCount",
    "FileName",
    "Diagnostics",
];

/// Streams located entries to `inner` in one of the [`OutputFormat`]s.
pub struct EntryWriter<W: Write> {
    inner: W,
    format: OutputFormat,
    sep: String,
    pretty: bool,
    wrote_header: bool,
}

impl<W: Write> EntryWriter<W> {
    pub fn new(inner: W, format: OutputFormat) -> Self {
        Self {
            inner,
            format,
            sep: ",".to_string(),
            pretty: false,
            wrote_header: false,
        }
    }

    pub fn separator(mut self, sep: &str) -> Self {
        self.sep = sep.to_string();
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn write(&mut self, located: &LocatedEntry) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let value = json_value(located);
                let written = if self.pretty {
                    serde_json::to_writer_pretty(&mut self.inner, &value)
                } else {
                    serde_json::to_writer(&mut self.inner, &value)
                };
                written.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                self.inner.write_all(b"\n")
            }
            OutputFormat::Csv => {
                if !self.wrote_header {
                    writeln!(self.inner, "{}", CSV_FIELDS.join(&self.sep))?;
                    self.wrote_header = true;
                }
                writeln!(self.inner, "{}", csv_row(located, &self.sep))
            }
            OutputFormat::Body => {
                for line in body_lines(located) {
                    writeln!(self.inner, "{}", line)?;
                }
                Ok(())
            }
            OutputFormat::Table => {
                writeln!(
                    self.inner,
                    "{} entry {}",
                    located.source.path.display(),
                    located.record_index
                )?;
                writeln!(self.inner, "{}", located.entry.to_table_string())
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn json_value(located: &LocatedEntry) -> Value {
    json!({
        "source": {
            "path": located.source.path,
            "hash": located.source.hash,
        },
        "record_index": located.record_index,
        "entry": located.entry.to_json(),
    })
}

/// Quote a field when it contains the separator, a quote or a line break.
pub fn quote(field: &str, sep: &str) -> String {
    if field.contains(sep) || field.contains(['"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn csv_row(located: &LocatedEntry, sep: &str) -> String {
    let entry = &located.entry;
    let h = &entry.header;
    let diagnostics: Vec<String> = entry.errors().map(|d| d.error.to_string()).collect();
    let fields = [
        located.source.path.display().to_string(),
        located.record_index.to_string(),
        h.mft_record_number.map(|n| n.to_string()).unwrap_or_default(),
        h.signature.as_str().to_string(),
        h.sequence_number.to_string(),
        h.log_file_sequence_number.to_string(),
        h.is_active().to_string(),
        h.has_index().to_string(),
        h.used_size.to_string(),
        h.total_size.to_string(),
        h.reference_count.to_string(),
        entry.standard_information.len().to_string(),
        entry.file_name.len().to_string(),
        entry.primary_name().unwrap_or_default().to_string(),
        diagnostics.join("; "),
    ];
    fields
        .iter()
        .map(|f| quote(f, sep))
        .collect::<Vec<_>>()
        .join(sep)
}

fn unix(t: &Option<DateTime<Utc>>) -> i64 {
    t.map_or(0, |t| t.timestamp())
}

fn mode(entry: &MftEntry) -> &'static str {
    if entry.is_directory() {
        "d/drwxrwxrwx"
    } else {
        "r/rrwxrwxrwx"
    }
}

/// Logical size of the unnamed $DATA stream, falling back to the $FILE_NAME size.
fn logical_size(entry: &MftEntry) -> u64 {
    entry
        .data
        .iter()
        .find(|a| a.header.name_length == 0)
        .map(|a| a.header.value_size())
        .or_else(|| entry.file_names().first().map(|f| f.real_size))
        .unwrap_or(0)
}

/// mactime bodyfile lines: `MD5|name|inode|mode|UID|GID|size|atime|mtime|ctime|crtime`.
pub fn body_lines(located: &LocatedEntry) -> Vec<String> {
    let entry = &located.entry;
    let inode = format!("{}-{}", located.record_index, entry.header.sequence_number);
    let name = entry.primary_name().unwrap_or("").replace('|', "_");
    let size = logical_size(entry);
    let mut lines = Vec::new();

    for si in entry.standard_information.iter().filter_map(|a| a.body.as_ref()) {
        lines.push(format!(
            "0|{}|{}|{}|0|0|{}|{}|{}|{}|{}",
            name,
            inode,
            mode(entry),
            size,
            unix(&si.accessed),
            unix(&si.modified),
            unix(&si.mft_modified),
            unix(&si.created)
        ));
    }
    for fname in entry.file_names() {
        lines.push(format!(
            "0|{} ($FILE_NAME)|{}|{}|0|0|{}|{}|{}|{}|{}",
            fname.name.replace('|', "_"),
            inode,
            mode(entry),
            fname.real_size,
            unix(&fname.accessed),
            unix(&fname.modified),
            unix(&fname.mft_modified),
            unix(&fname.created)
        ));
    }
    lines
}
