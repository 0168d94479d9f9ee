//! Capture time and duration extraction from media containers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Errors from probing and interpreting container metadata
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Probe of {locator} failed: {message}")]
    ProbeFailed { locator: String, message: String },

    #[error("Metadata unavailable for {locator}: {reason}")]
    MetadataUnavailable { locator: String, reason: String },

    #[error("Invalid creation timestamp {raw:?}: {reason}")]
    InvalidTimestamp { raw: String, reason: String },
}

/// Raw container-level values reported by the prober
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub creation_time_raw: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Capture instant and length of one recording.
///
/// The length is absent when the container does not report one (ffprobe
/// prints `N/A`); naming only needs the capture instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFileInfo {
    pub capture_time_utc: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
}

impl MediaFileInfo {
    /// Whole minutes, truncated
    pub fn duration_minutes(&self) -> Option<u64> {
        self.duration_seconds
            .map(|seconds| (seconds.max(0.0) / 60.0).floor() as u64)
    }
}

/// Reads container tags from a media locator (URL or local path)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProber: Send + Sync {
    async fn probe(&self, locator: &str) -> Result<ProbeReport, MetadataError>;
}

/// Prober that shells out to ffprobe
pub struct FfprobeProber {
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    creation_time: Option<String>,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn parse_output(locator: &str, stdout: &[u8]) -> Result<ProbeReport, MetadataError> {
        let output: FfprobeOutput =
            serde_json::from_slice(stdout).map_err(|e| MetadataError::ProbeFailed {
                locator: locator.to_string(),
                message: format!("unparseable ffprobe output: {}", e),
            })?;

        let Some(format) = output.format else {
            return Ok(ProbeReport::default());
        };

        Ok(ProbeReport {
            creation_time_raw: format.tags.and_then(|t| t.creation_time),
            duration_seconds: format.duration.and_then(|d| d.trim().parse::<f64>().ok()),
        })
    }
}

#[async_trait]
impl MetadataProber for FfprobeProber {
    #[instrument(skip(self), fields(process.executable.path = %self.ffprobe_path))]
    async fn probe(&self, locator: &str) -> Result<ProbeReport, MetadataError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(locator)
            .output()
            .await
            .map_err(|e| MetadataError::ProbeFailed {
                locator: locator.to_string(),
                message: format!("failed to execute ffprobe: {}", e),
            })?;

        if !output.status.success() {
            return Err(MetadataError::ProbeFailed {
                locator: locator.to_string(),
                message: format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Self::parse_output(locator, &output.stdout)
    }
}

/// Turns prober reports into [`MediaFileInfo`]
pub struct MetadataExtractor<'a> {
    prober: &'a dyn MetadataProber,
    assumed_source_zone: Tz,
}

impl<'a> MetadataExtractor<'a> {
    /// `assumed_source_zone` is the zone the creation tag's wall-clock
    /// reading is interpreted in.
    pub fn new(prober: &'a dyn MetadataProber, assumed_source_zone: Tz) -> Self {
        Self {
            prober,
            assumed_source_zone,
        }
    }

    pub async fn extract(&self, locator: &str) -> Result<MediaFileInfo, MetadataError> {
        let report = self.prober.probe(locator).await?;

        let raw = report
            .creation_time_raw
            .filter(|raw| !raw.trim().is_empty())
            .ok_or_else(|| MetadataError::MetadataUnavailable {
                locator: locator.to_string(),
                reason: "no creation_time tag".to_string(),
            })?;

        let capture_time_utc = normalize_capture_time(&raw, self.assumed_source_zone)?;

        let duration_seconds = report.duration_seconds;
        if duration_seconds.is_none() {
            warn!(locator = %locator, "Container reports no duration");
        }

        debug!(
            locator = %locator,
            capture_time = %capture_time_utc,
            duration_seconds = ?duration_seconds,
            "Metadata extracted"
        );

        Ok(MediaFileInfo {
            capture_time_utc,
            duration_seconds,
        })
    }
}

/// Interpret the wall-clock reading of a creation tag in `source_zone`.
///
/// Any offset suffix written by the recorder is ignored: only the date and
/// time fields are read.
pub fn normalize_capture_time(raw: &str, source_zone: Tz) -> Result<DateTime<Utc>, MetadataError> {
    let raw = raw.trim();
    let naive = parse_wall_clock(raw).ok_or_else(|| MetadataError::InvalidTimestamp {
        raw: raw.to_string(),
        reason: "unrecognized format".to_string(),
    })?;

    source_zone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| MetadataError::InvalidTimestamp {
            raw: raw.to_string(),
            reason: format!("does not exist in {}", source_zone),
        })
}

fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }

    let without_zone = raw.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zone, fmt).ok())
}
