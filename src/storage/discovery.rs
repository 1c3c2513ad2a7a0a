//! Input and table discovery.
//!
//! Instruments are the sub-directories of the input root, each holding that
//! instrument's snapshot CSVs. Both levels are visited in sorted name order
//! so runs over the same tree number rows identically.

use super::StorageError;
use crate::batch::SnapshotSource;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Snapshot files for one instrument, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFiles {
    pub instrument: String,
    pub files: Vec<(PathBuf, Arc<SnapshotSource>)>,
}

/// Date label for a snapshot file name: the second `_`-separated token of
/// the stem, `Unknown` if there is none.
pub fn date_label(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.split('_')
        .nth(1)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown".to_string())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

/// Every instrument directory under `root` with its `*.csv` files.
pub fn discover_instruments(root: &Path) -> Result<Vec<InstrumentFiles>, StorageError> {
    let mut instruments = Vec::new();

    for dir in sorted_entries(root)? {
        if !dir.is_dir() {
            continue;
        }
        let Some(instrument) = file_name(&dir) else {
            continue;
        };

        let files = sorted_entries(&dir)?
            .into_iter()
            .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "csv"))
            .filter_map(|p| {
                let name = file_name(&p)?;
                let source = SnapshotSource::new(instrument.clone(), name.clone(), date_label(&name));
                Some((p, Arc::new(source)))
            })
            .collect();

        instruments.push(InstrumentFiles { instrument, files });
    }

    Ok(instruments)
}

/// `slippage_*.parquet` tables in `dir`, skipping anything named `summary`.
pub fn discover_tables(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| {
            p.is_file()
                && file_name(p).map_or(false, |name| {
                    name.starts_with("slippage_")
                        && name.ends_with(".parquet")
                        && !name.contains("summary")
                })
        })
        .collect())
}

/// Instrument id encoded in a table file name, `slippage_<id>.parquet`.
pub fn instrument_from_table(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("slippage_").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_date_label() {
        assert_eq!(date_label("AAPL_20240102.csv"), "20240102");
        assert_eq!(date_label("AAPL_20240102_book.csv"), "20240102");
        assert_eq!(date_label("snapshot.csv"), "Unknown");
        assert_eq!(date_label("AAPL_.csv"), "Unknown");
    }

    #[test]
    fn test_instruments_and_files_sorted() {
        let dir = TempDir::new().unwrap();
        for (inst, file) in [
            ("MSFT", "MSFT_20240103.csv"),
            ("AAPL", "AAPL_20240103.csv"),
            ("AAPL", "AAPL_20240102.csv"),
            ("AAPL", "notes.txt"),
        ] {
            fs::create_dir_all(dir.path().join(inst)).unwrap();
            fs::write(dir.path().join(inst).join(file), "x").unwrap();
        }
        fs::write(dir.path().join("stray.csv"), "x").unwrap();

        let found = discover_instruments(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|i| i.instrument.as_str()).collect();
        assert_eq!(names, vec!["AAPL", "MSFT"]);

        let aapl: Vec<&str> = found[0].files.iter().map(|(_, s)| s.file_name.as_str()).collect();
        assert_eq!(aapl, vec!["AAPL_20240102.csv", "AAPL_20240103.csv"]);
        assert_eq!(found[0].files[0].1.date, "20240102");
        assert_eq!(found[0].files[0].1.instrument, "AAPL");
    }

    #[test]
    fn test_table_discovery_skips_summaries() {
        let dir = TempDir::new().unwrap();
        for name in [
            "slippage_MSFT.parquet",
            "slippage_AAPL.parquet",
            "slippage_summary.parquet",
            "other.parquet",
            "slippage_AAPL.csv",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let tables = discover_tables(dir.path()).unwrap();
        let ids: Vec<String> = tables.iter().filter_map(|p| instrument_from_table(p)).collect();
        assert_eq!(ids, vec!["AAPL", "MSFT"]);
    }
}
