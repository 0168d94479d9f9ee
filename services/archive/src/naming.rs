//! Canonical file and folder names derived from a capture instant.

use crate::metadata::MediaFileInfo;
use chrono_tz::Tz;

/// File extension of relocated recordings
pub const RECORDING_EXTENSION: &str = ".mp4";

/// File and folder names for one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNaming {
    /// `H-mm-ss_D-M-YYYY.mp4`
    pub file_name: String,
    /// `D-M-YYYY`
    pub date_folder: String,
}

impl DerivedNaming {
    /// The file name without its extension, as sent to the classification service
    pub fn start_label(&self) -> &str {
        self.file_name
            .strip_suffix(RECORDING_EXTENSION)
            .unwrap_or(&self.file_name)
            .trim()
    }
}

/// Derive names from the capture instant converted into `target_zone`.
///
/// Both names come from the same converted instant so they always fall on
/// the same calendar day.
pub fn derive_names(info: &MediaFileInfo, target_zone: Tz) -> DerivedNaming {
    let local = info.capture_time_utc.with_timezone(&target_zone);

    DerivedNaming {
        file_name: format!("{}{}", local.format("%-H-%M-%S_%-d-%-m-%Y"), RECORDING_EXTENSION),
        date_folder: local.format("%-d-%-m-%Y").to_string(),
    }
}

/// Turn a canonical start time such as `2024-03-10 08:00:00` into a file stem
/// (`2024-03-10_08-00-00`).
pub fn sanitize_start_time(start_time: &str) -> String {
    start_time
        .trim()
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn info_at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> MediaFileInfo {
        MediaFileInfo {
            capture_time_utc: Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap(),
            duration_seconds: Some(125.0),
        }
    }

    #[test]
    fn test_derive_names_ho_chi_minh() {
        let naming = derive_names(&info_at(2024, 3, 10, 1, 15, 30), chrono_tz::Asia::Ho_Chi_Minh);

        assert_eq!(naming.file_name, "8-15-30_10-3-2024.mp4");
        assert_eq!(naming.date_folder, "10-3-2024");
        assert_eq!(naming.start_label(), "8-15-30_10-3-2024");
    }

    #[test]
    fn test_derive_names_pads_minutes_and_seconds_only() {
        let naming = derive_names(&info_at(2023, 1, 2, 3, 4, 5), chrono_tz::UTC);

        assert_eq!(naming.file_name, "3-04-05_2-1-2023.mp4");
        assert_eq!(naming.date_folder, "2-1-2023");
    }

    #[test]
    fn test_conversion_crosses_midnight() {
        // 20:30 UTC is 03:30 the next day in UTC+7
        let naming = derive_names(&info_at(2024, 12, 31, 20, 30, 0), chrono_tz::Asia::Ho_Chi_Minh);

        assert_eq!(naming.file_name, "3-30-00_1-1-2025.mp4");
        assert_eq!(naming.date_folder, "1-1-2025");
    }

    #[test]
    fn test_derive_names_is_deterministic() {
        let info = info_at(2024, 6, 15, 12, 0, 59);
        let first = derive_names(&info, chrono_tz::Europe::Berlin);

        for _ in 0..10 {
            assert_eq!(derive_names(&info, chrono_tz::Europe::Berlin), first);
        }
    }

    #[test]
    fn test_folder_and_file_share_calendar_day() {
        let zones = [
            chrono_tz::UTC,
            chrono_tz::Asia::Ho_Chi_Minh,
            chrono_tz::Pacific::Kiritimati,
            chrono_tz::Pacific::Pago_Pago,
        ];

        for hour in 0..24 {
            let info = info_at(2024, 2, 29, hour, 59, 59);
            for zone in zones {
                let naming = derive_names(&info, zone);
                let date_part = naming.start_label().split('_').nth(1).unwrap();
                assert_eq!(date_part, naming.date_folder);
            }
        }
    }

    #[test]
    fn test_sanitize_start_time() {
        assert_eq!(sanitize_start_time("2024-03-10 08:00:00"), "2024-03-10_08-00-00");
        assert_eq!(sanitize_start_time("  2024-03-10 08:00:00 "), "2024-03-10_08-00-00");
        assert_eq!(sanitize_start_time("2024/03/10 08:00"), "2024-03-10_08-00");
        assert_eq!(sanitize_start_time("2024-03-10\t08:00:00"), "2024-03-10_08-00-00");
    }
}
