use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::season::Season;

/// Metadata about a snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotMetadata {
    pub path: PathBuf,
    pub tick: u64,
    pub timestamp: u64,
    pub file_size: u64,
}

#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    Serialize(String),
    Deserialize(String),
    /// Decoded, but failed the season integrity checks.
    Corrupt { path: PathBuf, reason: String },
    NoValidSnapshots,
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "I/O error: {}", e),
            SnapshotError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SnapshotError::Deserialize(e) => write!(f, "Deserialization error: {}", e),
            SnapshotError::Corrupt { path, reason } => {
                write!(f, "Corrupt snapshot {}: {}", path.display(), reason)
            }
            SnapshotError::NoValidSnapshots => {
                write!(
                    f,
                    "No valid snapshots found. Start a new season with: castaway new"
                )
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

fn snapshot_filename(tick: u64, timestamp: u64) -> String {
    format!("season-tick{}-{}.bin", tick, timestamp)
}

/// Expected format: `season-tick{N}-{timestamp}.bin`
fn parse_snapshot_filename(filename: &str) -> Option<(u64, u64)> {
    let stem = filename.strip_suffix(".bin")?;
    let rest = stem.strip_prefix("season-tick")?;
    let (tick_str, ts_str) = rest.split_once('-')?;
    let tick = tick_str.parse::<u64>().ok()?;
    let ts = ts_str.parse::<u64>().ok()?;
    Some((tick, ts))
}

fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Save a season snapshot. Writes a temp file and renames it into place, so
/// a partial write never replaces a good snapshot.
pub fn save_snapshot(season: &Season, snapshot_dir: &Path) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(snapshot_dir)?;

    let filename = snapshot_filename(season.tick, unix_timestamp_now());
    let target = snapshot_dir.join(&filename);
    let tmp = snapshot_dir.join(format!(".{}.tmp", filename));

    let encoded = bincode::serialize(season).map_err(|e| SnapshotError::Serialize(e.to_string()))?;

    if let Err(e) = fs::write(&tmp, &encoded) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }
    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    Ok(target)
}

/// Load a season and run its integrity checks.
pub fn load_snapshot(path: &Path) -> Result<Season, SnapshotError> {
    let data = fs::read(path)?;
    let season: Season =
        bincode::deserialize(&data).map_err(|e| SnapshotError::Deserialize(e.to_string()))?;

    season.check_integrity().map_err(|reason| SnapshotError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(season)
}

/// Snapshots in a directory, newest first.
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    if !snapshot_dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();
    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if filename.starts_with('.') {
            continue;
        }
        if let Some((tick, timestamp)) = parse_snapshot_filename(&filename) {
            let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            snapshots.push(SnapshotMetadata {
                path: path.clone(),
                tick,
                timestamp,
                file_size,
            });
        }
    }

    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.tick.cmp(&a.tick)));
    Ok(snapshots)
}

/// Keep the `max_snapshots` newest snapshots. Returns the deleted paths.
pub fn prune_snapshots(
    snapshot_dir: &Path,
    max_snapshots: usize,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    let mut deleted = Vec::new();
    if snapshots.len() > max_snapshots {
        for snapshot in &snapshots[max_snapshots..] {
            fs::remove_file(&snapshot.path)?;
            deleted.push(snapshot.path.clone());
        }
    }
    Ok(deleted)
}

/// Load the newest snapshot that decodes and passes integrity checks,
/// falling back to older ones.
pub fn load_latest_valid_snapshot(snapshot_dir: &Path) -> Result<Season, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    for snapshot in &snapshots {
        match load_snapshot(&snapshot.path) {
            Ok(season) => return Ok(season),
            Err(e) => {
                warn!(
                    path = %snapshot.path.display(),
                    error = %e,
                    "Corrupt snapshot, trying next"
                );
            }
        }
    }

    Err(SnapshotError::NoValidSnapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::roster::Roster;
    use crate::config::rules::GameRules;
    use crate::narration::TemplateNarrator;
    use crate::season::{SeasonSettings, start_season};
    use crate::simulation::{fulfil_offline, tick};
    use tempfile::TempDir;

    fn make_test_season(ticks: usize) -> Season {
        let roster = Roster::sample(42);
        let mut season = start_season(
            &roster.cast,
            42,
            Some("dax"),
            "host",
            SeasonSettings::default(),
            GameRules::default(),
        )
        .unwrap();
        for _ in 0..ticks {
            let result = tick(&mut season);
            fulfil_offline(&mut season, result.effects, Some(&TemplateNarrator));
        }
        season
    }

    #[test]
    fn save_and_load_round_trip_identical() {
        let dir = TempDir::new().unwrap();
        let season = make_test_season(40);

        let path = save_snapshot(&season, dir.path()).unwrap();
        let restored = load_snapshot(&path).unwrap();

        assert_eq!(season, restored);
    }

    #[test]
    fn restored_season_continues_identically() {
        let dir = TempDir::new().unwrap();
        let mut season = make_test_season(25);
        let path = save_snapshot(&season, dir.path()).unwrap();
        let mut restored = load_snapshot(&path).unwrap();

        for _ in 0..60 {
            let a = tick(&mut season);
            fulfil_offline(&mut season, a.effects, Some(&TemplateNarrator));
            let b = tick(&mut restored);
            fulfil_offline(&mut restored, b.effects, Some(&TemplateNarrator));
        }
        assert_eq!(season.log, restored.log);
        assert_eq!(season.phase, restored.phase);
    }

    #[test]
    fn snapshot_filename_parse_round_trip() {
        let filename = snapshot_filename(500, 1708300000);
        assert_eq!(filename, "season-tick500-1708300000.bin");

        let (tick, ts) = parse_snapshot_filename(&filename).unwrap();
        assert_eq!(tick, 500);
        assert_eq!(ts, 1708300000);
    }

    #[test]
    fn parse_invalid_filename_returns_none() {
        assert!(parse_snapshot_filename("random.bin").is_none());
        assert!(parse_snapshot_filename("season-tick.bin").is_none());
        assert!(parse_snapshot_filename("season-tickabc-123.bin").is_none());
        assert!(parse_snapshot_filename("season-tick100-abc.bin").is_none());
        assert!(parse_snapshot_filename("world-tick100-123.bin").is_none());
    }

    #[test]
    fn list_snapshots_returns_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let data = bincode::serialize(&make_test_season(0)).unwrap();

        fs::write(dir.path().join("season-tick10-1000.bin"), &data).unwrap();
        fs::write(dir.path().join("season-tick20-2000.bin"), &data).unwrap();
        fs::write(dir.path().join("season-tick30-3000.bin"), &data).unwrap();

        let snapshots = list_snapshots(dir.path()).unwrap();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].tick, 30);
        assert_eq!(snapshots[1].tick, 20);
        assert_eq!(snapshots[2].tick, 10);
    }

    #[test]
    fn list_snapshots_skips_non_snapshot_files() {
        let dir = TempDir::new().unwrap();
        let data = bincode::serialize(&make_test_season(0)).unwrap();

        fs::write(dir.path().join("season-tick10-1000.bin"), &data).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a snapshot").unwrap();
        fs::write(dir.path().join(".season-tick99-9999.bin.tmp"), "temp file").unwrap();

        assert_eq!(list_snapshots(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn list_snapshots_nonexistent_dir() {
        let dir = TempDir::new().unwrap();
        let snapshots = list_snapshots(&dir.path().join("missing")).unwrap();
        assert!(snapshots.is_empty());
    }

    #[test]
    fn prune_keeps_max_snapshots() {
        let dir = TempDir::new().unwrap();
        let data = bincode::serialize(&make_test_season(0)).unwrap();
        for i in 0..6u64 {
            fs::write(
                dir.path().join(format!("season-tick{}-{}.bin", i * 10, 1000 + i)),
                &data,
            )
            .unwrap();
        }

        let deleted = prune_snapshots(dir.path(), 3).unwrap();
        assert_eq!(deleted.len(), 3);

        let remaining = list_snapshots(dir.path()).unwrap();
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining[0].timestamp, 1005);
        assert_eq!(remaining[2].timestamp, 1003);
    }

    #[test]
    fn load_truncated_snapshot_returns_error() {
        let dir = TempDir::new().unwrap();
        let data = bincode::serialize(&make_test_season(10)).unwrap();
        let path = dir.path().join("season-tick0-1000.bin");
        fs::write(&path, &data[..data.len() / 2]).unwrap();

        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn integrity_failure_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut season = make_test_season(0);
        season.champion = Some("dax".to_string());
        let path = save_snapshot(&season, dir.path()).unwrap();

        assert!(matches!(load_snapshot(&path), Err(SnapshotError::Corrupt { .. })));
    }

    #[test]
    fn load_latest_valid_falls_back_on_corrupt() {
        let dir = TempDir::new().unwrap();
        let season = make_test_season(5);
        let valid = bincode::serialize(&season).unwrap();

        fs::write(dir.path().join("season-tick10-1000.bin"), &valid).unwrap();
        fs::write(dir.path().join("season-tick20-2000.bin"), b"corrupt data here").unwrap();

        let restored = load_latest_valid_snapshot(dir.path()).unwrap();
        assert_eq!(restored.id, season.id);
    }

    #[test]
    fn load_latest_valid_all_corrupt_returns_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("season-tick10-1000.bin"), b"corrupt1").unwrap();
        fs::write(dir.path().join("season-tick20-2000.bin"), b"corrupt2").unwrap();

        assert!(matches!(
            load_latest_valid_snapshot(dir.path()).unwrap_err(),
            SnapshotError::NoValidSnapshots
        ));
    }

    #[test]
    fn atomic_write_no_temp_files_remain() {
        let dir = TempDir::new().unwrap();
        save_snapshot(&make_test_season(0), dir.path()).unwrap();

        let temp_files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_str().is_some_and(|n| n.starts_with('.')))
            .collect();
        assert!(temp_files.is_empty());
    }

    #[test]
    fn save_creates_directory_if_missing() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("deep").join("snapshots");
        let path = save_snapshot(&make_test_season(0), &nested).unwrap();
        assert!(path.exists());
    }
}
