//! Age-based deletion of log files across an entire directory.

use std::fs;
use std::path::Path;

use chrono::{Local, NaiveTime};
use tracing::{debug, warn};

use crate::error::LogError;

/// Delete every log file in `dir` whose embedded date is `max_age_days` days
/// before today or older, including `export.log` snapshots.
///
/// The comparison is done at local noon on each side to stay correct across
/// a daylight-saving transition: subtracting two midnights that straddle a
/// DST shift can be off by an hour, which would occasionally keep or drop a
/// file exactly `max_age_days` old depending on the wall-clock offset of
/// the moment `cleanup` runs.
///
/// Returns the number of files removed. Files whose names don't parse as
/// `YYYY-MM-DD-N.log` (besides `export.log`) are left untouched.
pub fn cleanup(dir: impl AsRef<Path>, max_age_days: i64) -> Result<usize, LogError> {
    let dir = dir.as_ref();
    let today = Local::now().date_naive();
    let today_noon = today.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());

    let entries = fs::read_dir(dir).map_err(LogError::DirAccess)?;
    let mut removed = 0usize;

    for entry in entries {
        let entry = entry.map_err(LogError::DirAccess)?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "export.log" {
            continue;
        }
        let Some(date) = endlog_format::parse_date(name) else {
            continue;
        };
        let file_noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let age_days = (today_noon - file_noon).num_days();
        if age_days >= max_age_days {
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    debug!(path = %path.display(), age_days, "removed aged-out log file");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove aged-out log file");
                }
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use endlog_format::{create, file_name, SALT_LEN};
    use tempfile::tempdir;

    #[test]
    fn removes_only_files_older_than_the_cutoff() {
        let dir = tempdir().unwrap();
        let today = Local::now().date_naive();
        let old = today - Duration::days(10);
        let recent = today - Duration::days(1);

        let old_path = dir.path().join(file_name(old, 0));
        let recent_path = dir.path().join(file_name(recent, 0));
        create(&old_path, 1 << 20, [0u8; SALT_LEN]).unwrap();
        create(&recent_path, 1 << 20, [0u8; SALT_LEN]).unwrap();

        let removed = cleanup(dir.path(), 5).unwrap();
        assert_eq!(removed, 1);
        assert!(!old_path.exists());
        assert!(recent_path.exists());
    }

    #[test]
    fn removes_a_file_exactly_at_the_cutoff_age() {
        let dir = tempdir().unwrap();
        let today = Local::now().date_naive();
        let boundary = today - Duration::days(5);

        let path = dir.path().join(file_name(boundary, 0));
        create(&path, 1 << 20, [0u8; SALT_LEN]).unwrap();

        let removed = cleanup(dir.path(), 5).unwrap();
        assert_eq!(removed, 1);
        assert!(!path.exists());
    }

    #[test]
    fn leaves_unrecognized_files_alone() {
        let dir = tempdir().unwrap();
        let stray = dir.path().join("notes.txt");
        fs::write(&stray, b"hello").unwrap();
        let removed = cleanup(dir.path(), 0).unwrap();
        assert_eq!(removed, 0);
        assert!(stray.exists());
    }
}
