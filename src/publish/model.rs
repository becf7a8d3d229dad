use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Staged,
    Checking,
    PolicyPassed,
    ManualReview,
    Rejected,
    Anchoring,
    Anchored,
    Registering,
    Registered,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Staged => "staged",
            JobStatus::Checking => "checking",
            JobStatus::PolicyPassed => "policy_passed",
            JobStatus::ManualReview => "manual_review",
            JobStatus::Rejected => "rejected",
            JobStatus::Anchoring => "anchoring",
            JobStatus::Anchored => "anchored",
            JobStatus::Registering => "registering",
            JobStatus::Registered => "registered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "staged" => JobStatus::Staged,
            "checking" => JobStatus::Checking,
            "policy_passed" => JobStatus::PolicyPassed,
            "manual_review" => JobStatus::ManualReview,
            "rejected" => JobStatus::Rejected,
            "anchoring" => JobStatus::Anchoring,
            "anchored" => JobStatus::Anchored,
            "registering" => JobStatus::Registering,
            "registered" => JobStatus::Registered,
            _ => return None,
        })
    }

    /// Terminal states a job can never transition out of.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Rejected)
    }
}

/// `publish_type ∈ {original, derivative, cover}`. Derivative and cover
/// publishes carry parent IP IDs and license terms IDs instead of an
/// up-front audio hash check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishType {
    Original,
    Derivative,
    Cover,
}

impl PublishType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishType::Original => "original",
            PublishType::Derivative => "derivative",
            PublishType::Cover => "cover",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "original" => PublishType::Original,
            "derivative" => PublishType::Derivative,
            "cover" => PublishType::Cover,
            _ => return None,
        })
    }

    pub fn requires_parent_license(&self) -> bool {
        matches!(self, PublishType::Derivative | PublishType::Cover)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub job_id: String,
    pub user_address: String,
    pub status: JobStatus,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,

    pub audio_piece_cid: Option<String>,
    pub cover_piece_cid: Option<String>,
    pub lyrics_piece_cid: Option<String>,
    pub audio_bytes: Option<u64>,

    /// `original` | `derivative` | `cover`. Set at preflight time.
    pub publish_type: String,
    pub parent_ip_ids: Option<Vec<String>>,
    pub license_terms_ids: Option<Vec<String>>,

    pub preflight_reason: Option<String>,
    pub policy_decision: Option<String>,
    pub reason_code: Option<String>,

    /// keccak-derived identifiers computed by `finalize`.
    pub track_id: Option<String>,
    pub content_id: Option<String>,

    pub anchor_tx_hash: Option<String>,
    pub anchor_block_number: Option<u64>,

    /// IP/license registration result (`register`).
    pub register_tx_hash: Option<String>,
    pub register_block_number: Option<u64>,
    pub story_ip_id: Option<String>,
    pub story_token_id: Option<String>,
    pub story_license_terms_ids: Option<Vec<String>>,

    /// Secondary track/content registration result (`finalize`).
    pub finalize_tx_hash: Option<String>,

    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl PublishJob {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "jobId": self.job_id,
            "userAddress": self.user_address,
            "status": self.status.as_str(),
            "title": self.title,
            "artist": self.artist,
            "album": self.album,
            "audioPieceCid": self.audio_piece_cid,
            "coverPieceCid": self.cover_piece_cid,
            "lyricsPieceCid": self.lyrics_piece_cid,
            "publishType": self.publish_type,
            "parentIpIds": self.parent_ip_ids,
            "licenseTermsIds": self.license_terms_ids,
            "preflightReason": self.preflight_reason,
            "policyDecision": self.policy_decision,
            "reasonCode": self.reason_code,
            "trackId": self.track_id,
            "contentId": self.content_id,
            "anchorTxHash": self.anchor_tx_hash,
            "anchorBlockNumber": self.anchor_block_number,
            "txHash": self.register_tx_hash,
            "blockNumber": self.register_block_number,
            "storyIpId": self.story_ip_id,
            "storyTokenId": self.story_token_id,
            "storyLicenseTermsIds": self.story_license_terms_ids,
            "finalizeTxHash": self.finalize_tx_hash,
            "megaethTxHash": self.finalize_tx_hash,
            "tempoTxHash": self.finalize_tx_hash,
            "errorCode": self.error_code,
            "errorMessage": self.error_message,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
