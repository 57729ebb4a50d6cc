use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

use time::Date;
use tracing::info;

use crate::error::Result;
use crate::processor::ProcessorRecord;
use crate::report::{read_csv, write_csv};

/// Previously scraped records keyed by cpu id. A missing file is just an
/// empty cache.
pub fn load_cache(path: &Path) -> Result<HashMap<String, ProcessorRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no record cache yet");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };
    let records = read_csv(BufReader::new(file))?;
    info!(path = %path.display(), count = records.len(), "loaded record cache");
    Ok(records
        .into_iter()
        .filter_map(|r| Some((r.id.clone()?, r)))
        .collect())
}

pub fn save_cache(path: &Path, records: &[ProcessorRecord]) -> Result<()> {
    let file = File::create(path)?;
    write_csv(records, &mut BufWriter::new(file))?;
    info!(path = %path.display(), count = records.len(), "saved record cache");
    Ok(())
}

/// Whether `record` was scraped recently enough to skip fetching it again
pub fn is_fresh(record: &ProcessorRecord, today: Date, refresh_after: time::Duration) -> bool {
    match record.updated {
        Some(updated) => updated
            .checked_add(refresh_after)
            .map_or(true, |stale_on| stale_on > today),
        None => false,
    }
}
