use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use thiserror::Error;
use unicode_width::UnicodeWidthStr;

use crate::error::Result;
use crate::processor::ProcessorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
}

#[derive(Debug, Error)]
#[error("unknown output format {0:?}, expected `text` or `csv`")]
pub struct UnknownFormat(String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Orders records best first. The sort is stable, so records with the same
/// score keep the order they were scraped in.
pub fn rank_records(mut records: Vec<ProcessorRecord>) -> Vec<ProcessorRecord> {
    records.sort_by(|a, b| b.score.cmp(&a.score));
    records
}

pub fn render(
    records: &[ProcessorRecord],
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    match format {
        OutputFormat::Text => render_text(records, out),
        OutputFormat::Csv => write_csv(records, out),
    }
}

struct Column {
    header: &'static str,
    cell: fn(usize, &ProcessorRecord) -> Option<String>,
}

const COLUMNS: &[Column] = &[
    Column {
        header: "#",
        cell: |position, _| Some(position.to_string()),
    },
    Column {
        header: "Name",
        cell: |_, r| Some(r.name.clone()),
    },
    Column {
        header: "Multi Thread",
        cell: |_, r| Some(r.score.to_string()),
    },
    Column {
        header: "Single Thread",
        cell: |_, r| r.single_thread.map(|s| s.to_string()),
    },
    Column {
        header: "TDP",
        cell: |_, r| r.tdp.map(|w| format!("{} W", w)),
    },
    Column {
        header: "Cores",
        cell: |_, r| r.cores_display(),
    },
    Column {
        header: "# Samples",
        cell: |_, r| r.samples.map(|s| s.to_string()),
    },
    Column {
        header: "First Seen",
        cell: |_, r| r.first_seen.clone(),
    },
    Column {
        header: "Price",
        cell: |_, r| r.price.map(|p| format!("${:.2}", p)),
    },
];

/// Number of always-present columns at the front of the table
const REQUIRED_COLUMNS: usize = 3;

/// Prints `records` as a ranked table, in the order given.
///
/// Optional columns nobody has a value for are left out. The first column is
/// left aligned, the last right aligned and everything in between centered.
pub fn render_text(records: &[ProcessorRecord], out: &mut impl Write) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let rows: Vec<Vec<Option<String>>> = records
        .iter()
        .enumerate()
        .map(|(i, r)| COLUMNS.iter().map(|c| (c.cell)(i + 1, r)).collect())
        .collect();
    let shown: Vec<usize> = (0..COLUMNS.len())
        .filter(|&c| c < REQUIRED_COLUMNS || rows.iter().any(|row| row[c].is_some()))
        .collect();
    let widths: Vec<usize> = shown
        .iter()
        .map(|&c| {
            rows.iter()
                .filter_map(|row| row[c].as_deref())
                .map(UnicodeWidthStr::width)
                .chain(std::iter::once(COLUMNS[c].header.width()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<&str> = shown.iter().map(|&c| COLUMNS[c].header).collect();
    write_row(out, &header, &widths)?;
    for row in &rows {
        let cells: Vec<&str> = shown
            .iter()
            .map(|&c| row[c].as_deref().unwrap_or("-"))
            .collect();
        write_row(out, &cells, &widths)?;
    }
    Ok(())
}

fn write_row(out: &mut impl Write, cells: &[&str], widths: &[usize]) -> Result<()> {
    let last = cells.len() - 1;
    let line = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, &width))| {
            let pad = width.saturating_sub(cell.width());
            if i == 0 {
                format!("{}{}", cell, " ".repeat(pad))
            } else if i == last {
                format!("{}{}", " ".repeat(pad), cell)
            } else {
                let left = pad / 2;
                format!("{}{}{}", " ".repeat(left), cell, " ".repeat(pad - left))
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{}", line)?;
    Ok(())
}

pub fn write_csv(records: &[ProcessorRecord], out: &mut impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv(input: impl Read) -> Result<Vec<ProcessorRecord>> {
    let mut reader = csv::Reader::from_reader(input);
    Ok(reader
        .deserialize::<ProcessorRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?)
}
