//! Scan lifecycle record and its options.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::post::PostMetric;
use crate::provider::Provider;

pub const MAX_PROVIDERS: usize = 3;
pub const MAX_LOOKBACK_DAYS: u32 = 365;
pub const MAX_COMPETITORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// Caller-supplied scan parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub providers: Vec<Provider>,
    pub lookback_days: u32,
    #[serde(default)]
    pub competitor_ids: Vec<String>,
    #[serde(default = "default_include_own_posts")]
    pub include_own_posts: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_include_own_posts() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

impl ScanOptions {
    #[must_use]
    pub fn new(providers: Vec<Provider>, lookback_days: u32) -> Self {
        Self {
            providers,
            lookback_days,
            competitor_ids: Vec::new(),
            include_own_posts: true,
            timezone: default_timezone(),
        }
    }

    /// Checks provider count, lookback range, competitor list, and timezone.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.providers.is_empty() || self.providers.len() > MAX_PROVIDERS {
            return Err(IngestError::Validation(format!(
                "between 1 and {MAX_PROVIDERS} providers are required, got {}",
                self.providers.len()
            )));
        }
        let unique: HashSet<_> = self.providers.iter().collect();
        if unique.len() != self.providers.len() {
            return Err(IngestError::Validation(
                "providers must not repeat".to_owned(),
            ));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(IngestError::Validation(format!(
                "lookback must be 1-{MAX_LOOKBACK_DAYS} days, got {}",
                self.lookback_days
            )));
        }
        if self.competitor_ids.len() > MAX_COMPETITORS {
            return Err(IngestError::Validation(format!(
                "at most {MAX_COMPETITORS} competitors are allowed, got {}",
                self.competitor_ids.len()
            )));
        }
        if self.competitor_ids.iter().any(|c| c.trim().is_empty()) {
            return Err(IngestError::Validation(
                "competitor ids must not be blank".to_owned(),
            ));
        }
        self.utc_offset()?;
        Ok(())
    }

    /// Parses `timezone` as `UTC`, `Z`, or a fixed `±HH:MM` offset.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for any other form.
    pub fn utc_offset(&self) -> Result<FixedOffset, IngestError> {
        parse_offset(&self.timezone)
            .ok_or_else(|| IngestError::Validation(format!("unsupported timezone \"{}\"", self.timezone)))
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let tz = raw.trim();
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" || tz.is_empty() {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours = unsigned_part(hours)?;
    let minutes = unsigned_part(minutes)?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    let secs = i32::try_from(hours * 3600 + minutes * 60).ok()?;
    FixedOffset::east_opt(sign * secs)
}

/// Bare ASCII digits only; `u32::from_str` alone would accept a `+` prefix.
fn unsigned_part(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Engagement aggregated over one local hour of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakTime {
    pub hour: u32,
    pub post_count: usize,
    pub total_engagement: f64,
    pub average_engagement: f64,
}

/// Aggregate metrics, present only on completed scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub total_posts: usize,
    pub average_engagement: f64,
    pub peak_times: Vec<PeakTime>,
    pub top_performing_posts: Vec<PostMetric>,
}

/// One asynchronous collection job.
///
/// Status moves `pending → in_progress → {completed | failed}` and never
/// backwards; the transition methods return `false` when a move is not allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    pub user_id: String,
    pub options: ScanOptions,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<ScanResults>,
    pub error: Option<String>,
}

impl Scan {
    #[must_use]
    pub fn new(id: String, user_id: String, options: ScanOptions, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            options,
            status: ScanStatus::Pending,
            created_at,
            completed_at: None,
            results: None,
            error: None,
        }
    }

    pub fn mark_in_progress(&mut self) -> bool {
        if self.status != ScanStatus::Pending {
            return false;
        }
        self.status = ScanStatus::InProgress;
        true
    }

    pub fn complete(&mut self, results: ScanResults, at: DateTime<Utc>) -> bool {
        if self.status != ScanStatus::InProgress {
            return false;
        }
        self.status = ScanStatus::Completed;
        self.results = Some(results);
        self.completed_at = Some(at);
        true
    }

    /// Fails a pending or in-progress scan. Results are never attached to a
    /// failed scan.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ScanStatus::Failed;
        self.error = Some(error.into());
        self.results = None;
        self.completed_at = Some(at);
        true
    }
}
