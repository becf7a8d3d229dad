//! Preflight policy checks run between `stage_artifacts` and `anchor`.

use super::model::{JobStatus, PublishJob};
use crate::config::PublishSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    Passed,
    ManualReview(String),
    Rejected(String),
}

impl PreflightOutcome {
    pub fn next_status(&self) -> JobStatus {
        match self {
            PreflightOutcome::Passed => JobStatus::PolicyPassed,
            PreflightOutcome::ManualReview(_) => JobStatus::ManualReview,
            PreflightOutcome::Rejected(_) => JobStatus::Rejected,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            PreflightOutcome::Passed => None,
            PreflightOutcome::ManualReview(r) | PreflightOutcome::Rejected(r) => Some(r),
        }
    }
}

/// `publish_type ∈ {derivative, cover}` requires a non-empty, equal-length
/// set of parent IP IDs and license terms IDs — the license these jobs
/// publish under is inherited, not minted fresh.
pub fn requires_parent_link(job: &PublishJob) -> bool {
    matches!(super::model::PublishType::parse(&job.publish_type), Some(pt) if pt.requires_parent_license())
}

pub fn parent_link_satisfied(job: &PublishJob) -> bool {
    let parents = job.parent_ip_ids.as_deref().unwrap_or_default();
    let terms = job.license_terms_ids.as_deref().unwrap_or_default();
    !parents.is_empty() && parents.len() == terms.len()
}

/// Runs the staged job through size, completeness, and quota checks.
/// Chain/uploader calls are not part of preflight — this is pure policy.
pub fn run_preflight(
    job: &PublishJob,
    settings: &PublishSettings,
    jobs_in_window: u32,
    bytes_in_window: u64,
) -> PreflightOutcome {
    if requires_parent_link(job) && !parent_link_satisfied(job) {
        return PreflightOutcome::Rejected("parent_link_required".to_string());
    }

    if job.audio_piece_cid.is_none() {
        return PreflightOutcome::Rejected("missing staged audio artifact".to_string());
    }
    let Some(title) = job.title.as_deref().filter(|s| !s.trim().is_empty()) else {
        return PreflightOutcome::Rejected("missing title".to_string());
    };
    let Some(artist) = job.artist.as_deref().filter(|s| !s.trim().is_empty()) else {
        return PreflightOutcome::Rejected("missing artist".to_string());
    };
    let _ = title;
    let _ = artist;

    if let Some(bytes) = job.audio_bytes {
        if bytes > settings.max_artifact_bytes {
            return PreflightOutcome::Rejected(format!(
                "audio artifact {bytes} bytes exceeds max {}",
                settings.max_artifact_bytes
            ));
        }
    }

    if jobs_in_window >= settings.max_jobs_per_24h {
        return PreflightOutcome::ManualReview(format!(
            "user already has {jobs_in_window} publishes in the last 24h"
        ));
    }
    if bytes_in_window + job.audio_bytes.unwrap_or(0) > settings.max_bytes_per_24h {
        return PreflightOutcome::ManualReview(format!(
            "user's 24h publish volume would exceed {} bytes",
            settings.max_bytes_per_24h
        ));
    }

    PreflightOutcome::Passed
}
