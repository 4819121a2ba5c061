use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use tracing::debug;

use crate::error::Error;

/// How a capture date was derived, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Exact,
    FilenameDerived,
    FilesystemFallback,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Exact => "exact",
            Confidence::FilenameDerived => "filename-derived",
            Confidence::FilesystemFallback => "filesystem-fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub confidence: Confidence,
}

const DATETIME_FORMATS: &[(usize, &str)] = &[
    (19, "%Y:%m:%d %H:%M:%S"),
    (19, "%Y-%m-%d %H:%M:%S"),
    (19, "%Y-%m-%dT%H:%M:%S"),
    (16, "%Y-%m-%d %H:%M"),
    (16, "%Y:%m:%d %H:%M"),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y:%m:%d"];

/// Derives capture dates for assets. Holds the accepted date range for one run.
#[derive(Debug, Clone, Copy)]
pub struct DateResolver {
    min: NaiveDate,
    max: NaiveDate,
}

impl DateResolver {
    /// `today` is the last accepted date; anything later is "in the future".
    pub fn new(min_year: i32, today: NaiveDate) -> Self {
        let min = NaiveDate::from_ymd_opt(min_year, 1, 1).unwrap_or(NaiveDate::MIN);
        Self { min, max: today }
    }

    pub fn for_today(min_year: i32) -> Self {
        Self::new(min_year, Local::now().date_naive())
    }

    /// Resolve a date by priority: external timestamp, filename prefix, then mtime.
    ///
    /// An external timestamp that does not parse counts as absent. A date that
    /// parses but falls outside the accepted range is an [`Error::InvalidDate`].
    pub fn resolve(
        &self,
        file_name: &str,
        external: Option<&str>,
        modified: SystemTime,
    ) -> Result<ResolvedDate, Error> {
        if let Some(date) = external.and_then(parse_timestamp) {
            return self.checked(date, Confidence::Exact);
        }

        if let Some(date) = filename_date(file_name) {
            return self.checked(date, Confidence::FilenameDerived);
        }

        Ok(mtime_date(modified))
    }

    /// Like [`resolve`](Self::resolve), but an out-of-range date falls back to
    /// mtime. The rejection, if any, is returned alongside for accounting.
    pub fn resolve_or_fallback(
        &self,
        file_name: &str,
        external: Option<&str>,
        modified: SystemTime,
    ) -> (ResolvedDate, Option<Error>) {
        match self.resolve(file_name, external, modified) {
            Ok(resolved) => (resolved, None),
            Err(e) => {
                debug!("{}: {}, using modification time", file_name, e);
                (mtime_date(modified), Some(e))
            }
        }
    }

    fn checked(&self, date: NaiveDate, confidence: Confidence) -> Result<ResolvedDate, Error> {
        if date < self.min || date > self.max {
            return Err(Error::InvalidDate {
                date,
                min: self.min,
                max: self.max,
            });
        }
        Ok(ResolvedDate { date, confidence })
    }
}

/// Parse a raw timestamp as produced by metadata tools. Time zones and
/// sub-second parts are ignored; the wall-clock date is what gets filed.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("0000") {
        return None;
    }

    for (len, format) in DATETIME_FORMATS {
        if let Some(prefix) = raw.get(..*len) {
            if let Ok(dt) = NaiveDateTime::parse_from_str(prefix, format) {
                return Some(dt.date());
            }
        }
    }

    let prefix = raw.get(..10)?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(prefix, format).ok())
}

/// The leading `YYYY-MM-DD` of a file name, checked for shape only.
pub fn filename_date_token(file_name: &str) -> Option<&str> {
    let token = file_name.get(..10)?;
    let shaped = token.char_indices().all(|(i, c)| match i {
        4 | 7 => c == '-',
        _ => c.is_ascii_digit(),
    });
    shaped.then_some(token)
}

/// The leading `YYYY-MM-DD` of a file name, if it is a real calendar date.
pub fn filename_date(file_name: &str) -> Option<NaiveDate> {
    let token = filename_date_token(file_name)?;
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

/// The local calendar date of a modification time.
pub fn mtime_date(modified: SystemTime) -> ResolvedDate {
    let local: DateTime<Local> = modified.into();
    ResolvedDate {
        date: local.date_naive(),
        confidence: Confidence::FilesystemFallback,
    }
}

/// `2021` -> `2020+`
pub fn decade_label(year: i32) -> String {
    format!("{}+", year.div_euclid(10) * 10)
}

pub fn year_month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn resolver() -> DateResolver {
        DateResolver::new(1900, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2015-06-15 12:00:00 UTC
    fn june_2015() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_434_369_600)
    }

    fn june_2015_local() -> NaiveDate {
        DateTime::<Local>::from(june_2015()).date_naive()
    }

    #[test]
    fn test_external_timestamp_is_exact() {
        let resolved = resolver()
            .resolve("IMG_0001.jpg", Some("2021:07:04 10:11:12"), june_2015())
            .unwrap();
        assert_eq!(resolved.date, ymd(2021, 7, 4));
        assert_eq!(resolved.confidence, Confidence::Exact);
    }

    #[test]
    fn test_external_timestamp_wins_over_filename() {
        let resolved = resolver()
            .resolve("2019-01-01_party.jpg", Some("2021-07-04T10:11:12+02:00"), june_2015())
            .unwrap();
        assert_eq!(resolved.date, ymd(2021, 7, 4));
        assert_eq!(resolved.confidence, Confidence::Exact);
    }

    #[test]
    fn test_unparseable_external_falls_through_to_filename() {
        let resolved = resolver()
            .resolve("2019-01-01_party.jpg", Some("0000:00:00 00:00:00"), june_2015())
            .unwrap();
        assert_eq!(resolved.date, ymd(2019, 1, 1));
        assert_eq!(resolved.confidence, Confidence::FilenameDerived);
    }

    #[test]
    fn test_mtime_fallback() {
        let resolved = resolver().resolve("IMG_0001.jpg", None, june_2015()).unwrap();
        assert_eq!(resolved.date, june_2015_local());
        assert_eq!(resolved.confidence, Confidence::FilesystemFallback);
    }

    #[test]
    fn test_out_of_range_is_invalid_date() {
        let err = resolver()
            .resolve("IMG.jpg", Some("1850:01:01 00:00:00"), june_2015())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDate { .. }));

        let err = resolver()
            .resolve("2030-05-05_future.jpg", None, june_2015())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDate { .. }));
    }

    #[test]
    fn test_invalid_date_recovers_with_mtime() {
        let (resolved, rejected) =
            resolver().resolve_or_fallback("2030-05-05_future.jpg", None, june_2015());
        assert_eq!(resolved.confidence, Confidence::FilesystemFallback);
        assert_eq!(resolved.date, june_2015_local());
        assert!(matches!(rejected, Some(Error::InvalidDate { .. })));

        let (resolved, rejected) =
            resolver().resolve_or_fallback("2015-06-01_ok.jpg", None, june_2015());
        assert_eq!(resolved.confidence, Confidence::FilenameDerived);
        assert!(rejected.is_none());
    }

    #[test]
    fn test_filename_date_shapes() {
        assert_eq!(filename_date("2025-05-31_1200.jpg"), Some(ymd(2025, 5, 31)));
        assert_eq!(filename_date("2025-02-30.jpg"), None);
        assert_eq!(filename_date("2025_05_31.jpg"), None);
        assert_eq!(filename_date("IMG.jpg"), None);
        assert_eq!(filename_date_token("2025-99-99 x.jpg"), Some("2025-99-99"));
        assert_eq!(filename_date_token("2025-05-3"), None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp("2021:07:04 10:11:12.345"), Some(ymd(2021, 7, 4)));
        assert_eq!(parse_timestamp("2021-07-04 10:11"), Some(ymd(2021, 7, 4)));
        assert_eq!(parse_timestamp("2021:07:04"), Some(ymd(2021, 7, 4)));
        assert_eq!(parse_timestamp("  "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_decade_label() {
        assert_eq!(decade_label(2021), "2020+");
        assert_eq!(decade_label(1999), "1990+");
        assert_eq!(decade_label(2000), "2000+");
    }
}
