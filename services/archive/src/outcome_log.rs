//! Daily-partitioned text log of relocation outcomes.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Line closing every record
pub const RECORD_SEPARATOR: &str = "==========================";

#[derive(Error, Debug)]
pub enum OutcomeLogError {
    #[error("Failed to write outcome log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only text log with one file per processing day.
///
/// Files are named `DD-MM-YYYY.txt`; each record is a `H:mm:ss D-M-YYYY`
/// header, the body, and [`RECORD_SEPARATOR`].
pub struct OutcomeLog {
    dir: PathBuf,
    zone: Tz,
}

impl OutcomeLog {
    pub fn new(dir: impl Into<PathBuf>, zone: Tz) -> Self {
        Self {
            dir: dir.into(),
            zone,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Partition file for records written at `at`
    pub fn partition_path(&self, at: DateTime<Utc>) -> PathBuf {
        let local = at.with_timezone(&self.zone);
        self.dir.join(format!("{}.txt", local.format("%d-%m-%Y")))
    }

    /// Append one record, creating the directory and partition as needed
    pub async fn append(&self, at: DateTime<Utc>, body: &str) -> Result<PathBuf, OutcomeLogError> {
        let path = self.partition_path(at);
        let io_err = |source| OutcomeLogError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let header = at.with_timezone(&self.zone).format("%-H:%M:%S %-d-%-m-%Y");
        let record = format!("{}\n{}\n{}\n", header, body.trim_end(), RECORD_SEPARATOR);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        file.write_all(record.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!(path = %path.display(), "Outcome record appended");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_partition_uses_processing_zone() {
        let log = OutcomeLog::new("/var/log/archive", chrono_tz::Asia::Ho_Chi_Minh);

        // 20:00 UTC on the 10th is already the 11th in UTC+7
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();
        assert_eq!(
            log.partition_path(at),
            PathBuf::from("/var/log/archive/11-03-2024.txt")
        );
    }

    #[tokio::test]
    async fn test_append_writes_header_body_separator() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutcomeLog::new(dir.path().join("logs"), chrono_tz::Asia::Ho_Chi_Minh);
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 1, 5, 9).unwrap();

        let path = log.append(at, "first record\n").await.unwrap();
        log.append(at, "second record").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            format!(
                "8:05:09 10-3-2024\nfirst record\n{sep}\n8:05:09 10-3-2024\nsecond record\n{sep}\n",
                sep = RECORD_SEPARATOR
            )
        );
    }

    #[tokio::test]
    async fn test_separate_days_use_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutcomeLog::new(dir.path(), chrono_tz::UTC);

        let day_one = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();

        let first = log.append(day_one, "a").await.unwrap();
        let second = log.append(day_two, "b").await.unwrap();

        assert_ne!(first, second);
        assert!(first.ends_with("10-03-2024.txt"));
        assert!(second.ends_with("11-03-2024.txt"));
    }
}
