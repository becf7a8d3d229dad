use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::sqlite_persistence::versioned_schema::{Column, SqlType, Table, VersionedSchema};

use super::ids::generate_job_id;
use super::model::{JobStatus, PublishJob};
use super::PublishError;

const PUBLISH_JOBS_TABLE: Table = Table {
    name: "music_publish_jobs",
    columns: &[
        Column {
            name: "job_id",
            sql_type: &SqlType::Text,
            is_primary_key: true,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "user_address",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "status",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "title",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "artist",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "album",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "audio_piece_cid",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "cover_piece_cid",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "lyrics_piece_cid",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "audio_bytes",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "preflight_reason",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "track_id",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "content_id",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "anchor_tx_hash",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "anchor_block_number",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "register_tx_hash",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "register_block_number",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "publish_type",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: Some("'original'"),
            foreign_key: None,
        },
        Column {
            name: "parent_ip_ids",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "license_terms_ids",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "policy_decision",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "reason_code",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "story_ip_id",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "story_token_id",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "story_license_terms_ids",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "finalize_tx_hash",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "error_code",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "error_message",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "created_at",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "updated_at",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
    ],
    indices: &[("idx_publish_jobs_user", "user_address")],
    unique_constraints: &[],
};

const SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[PUBLISH_JOBS_TABLE],
    migration: None,
};

/// Store abstraction for the publish job state machine, so handlers and
/// tests can swap in a fake without touching sqlite.
pub trait PublishJobStore: Send + Sync {
    fn create_job(&self, user_address: &str, title: &str, artist: &str, album: &str) -> Result<PublishJob>;
    fn get_job(&self, job_id: &str) -> Result<Option<PublishJob>>;

    /// Atomically move `job_id` from one of `expected` to `next`, returning
    /// `false` (not an error) if the job's status had already moved on —
    /// the caller decides whether that's a conflict or a no-op retry.
    fn transition(&self, job_id: &str, expected: &[JobStatus], next: JobStatus) -> Result<bool>;

    fn stage_artifacts(
        &self,
        job_id: &str,
        audio_piece_cid: Option<&str>,
        cover_piece_cid: Option<&str>,
        lyrics_piece_cid: Option<&str>,
        audio_bytes: Option<u64>,
    ) -> Result<bool>;

    /// Records the caller-supplied publish type and, for derivative/cover
    /// jobs, the parent IP IDs and license terms IDs — persisted ahead of
    /// `run_preflight` so the parent-link check has something to read.
    fn set_policy_input(
        &self,
        job_id: &str,
        publish_type: &str,
        parent_ip_ids: Option<&[String]>,
        license_terms_ids: Option<&[String]>,
    ) -> Result<()>;

    fn set_preflight_result(&self, job_id: &str, next: JobStatus, reason: Option<&str>) -> Result<bool>;
    fn set_anchor_result(&self, job_id: &str, tx_hash: &str, block_number: u64) -> Result<bool>;
    fn set_metadata(&self, job_id: &str, title: &str, artist: &str, album: &str) -> Result<bool>;
    fn set_finalize_ids(&self, job_id: &str, track_id: &str, content_id: &str) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn set_register_result(
        &self,
        job_id: &str,
        tx_hash: &str,
        block_number: u64,
        story_ip_id: &str,
        story_token_id: &str,
        story_license_terms_ids: &[String],
    ) -> Result<bool>;

    /// Records the secondary track/content registration tx hash. Does not
    /// gate on status — callers drive the `registering` -> `registered`
    /// transition themselves once all best-effort actions have settled.
    fn set_finalize_result(&self, job_id: &str, finalize_tx_hash: Option<&str>) -> Result<()>;

    fn set_error(&self, job_id: &str, error_code: &str, error_message: &str) -> Result<()>;

    /// Count of jobs created by `user_address` since `since_unix` and the
    /// sum of their staged audio bytes, for the rolling 24h publish quota.
    fn usage_since(&self, user_address: &str, since_unix: i64) -> Result<(u32, u64)>;
}

pub struct SqlitePublishJobStore {
    conn: Mutex<Connection>,
}

impl SqlitePublishJobStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                params![PUBLISH_JOBS_TABLE.name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            SCHEMA.create(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SCHEMA.create(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<PublishJob> {
        let status_str: String = row.get("status")?;
        Ok(PublishJob {
            job_id: row.get("job_id")?,
            user_address: row.get("user_address")?,
            status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Staged),
            title: row.get("title")?,
            artist: row.get("artist")?,
            album: row.get("album")?,
            audio_piece_cid: row.get("audio_piece_cid")?,
            cover_piece_cid: row.get("cover_piece_cid")?,
            lyrics_piece_cid: row.get("lyrics_piece_cid")?,
            audio_bytes: row.get::<_, Option<i64>>("audio_bytes")?.map(|v| v as u64),
            publish_type: row.get("publish_type")?,
            parent_ip_ids: parse_json_string_vec(row.get("parent_ip_ids")?),
            license_terms_ids: parse_json_string_vec(row.get("license_terms_ids")?),
            preflight_reason: row.get("preflight_reason")?,
            policy_decision: row.get("policy_decision")?,
            reason_code: row.get("reason_code")?,
            track_id: row.get("track_id")?,
            content_id: row.get("content_id")?,
            anchor_tx_hash: row.get("anchor_tx_hash")?,
            anchor_block_number: row
                .get::<_, Option<i64>>("anchor_block_number")?
                .map(|v| v as u64),
            register_tx_hash: row.get("register_tx_hash")?,
            register_block_number: row
                .get::<_, Option<i64>>("register_block_number")?
                .map(|v| v as u64),
            story_ip_id: row.get("story_ip_id")?,
            story_token_id: row.get("story_token_id")?,
            story_license_terms_ids: parse_json_string_vec(row.get("story_license_terms_ids")?),
            finalize_tx_hash: row.get("finalize_tx_hash")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn parse_json_string_vec(raw: Option<String>) -> Option<Vec<String>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn to_json_string_vec(values: Option<&[String]>) -> Option<String> {
    values.map(|v| serde_json::to_string(v).unwrap_or_default())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl PublishJobStore for SqlitePublishJobStore {
    fn create_job(&self, user_address: &str, title: &str, artist: &str, album: &str) -> Result<PublishJob> {
        let conn = self.conn.lock().unwrap();
        let job_id = generate_job_id();
        let ts = now();
        conn.execute(
            "INSERT INTO music_publish_jobs
                (job_id, user_address, status, title, artist, album, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![job_id, user_address, JobStatus::Staged.as_str(), title, artist, album, ts],
        )?;
        Ok(PublishJob {
            job_id,
            user_address: user_address.to_string(),
            status: JobStatus::Staged,
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            audio_piece_cid: None,
            cover_piece_cid: None,
            lyrics_piece_cid: None,
            audio_bytes: None,
            publish_type: "original".to_string(),
            parent_ip_ids: None,
            license_terms_ids: None,
            preflight_reason: None,
            policy_decision: None,
            reason_code: None,
            track_id: None,
            content_id: None,
            anchor_tx_hash: None,
            anchor_block_number: None,
            register_tx_hash: None,
            register_block_number: None,
            story_ip_id: None,
            story_token_id: None,
            story_license_terms_ids: None,
            finalize_tx_hash: None,
            error_code: None,
            error_message: None,
            created_at: ts,
            updated_at: ts,
        })
    }

    fn get_job(&self, job_id: &str) -> Result<Option<PublishJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT * FROM music_publish_jobs WHERE job_id = ?1",
                params![job_id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn transition(&self, job_id: &str, expected: &[JobStatus], next: JobStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        for status in expected {
            let affected = conn.execute(
                "UPDATE music_publish_jobs SET status = ?1, updated_at = ?2
                 WHERE job_id = ?3 AND status = ?4",
                params![next.as_str(), now(), job_id, status.as_str()],
            )?;
            if affected == 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn stage_artifacts(
        &self,
        job_id: &str,
        audio_piece_cid: Option<&str>,
        cover_piece_cid: Option<&str>,
        lyrics_piece_cid: Option<&str>,
        audio_bytes: Option<u64>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE music_publish_jobs SET
                audio_piece_cid = COALESCE(?1, audio_piece_cid),
                cover_piece_cid = COALESCE(?2, cover_piece_cid),
                lyrics_piece_cid = COALESCE(?3, lyrics_piece_cid),
                audio_bytes = COALESCE(?4, audio_bytes),
                updated_at = ?5
             WHERE job_id = ?6 AND status = ?7",
            params![
                audio_piece_cid,
                cover_piece_cid,
                lyrics_piece_cid,
                audio_bytes.map(|v| v as i64),
                now(),
                job_id,
                JobStatus::Staged.as_str(),
            ],
        )?;
        Ok(affected == 1)
    }

    fn set_policy_input(
        &self,
        job_id: &str,
        publish_type: &str,
        parent_ip_ids: Option<&[String]>,
        license_terms_ids: Option<&[String]>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE music_publish_jobs SET publish_type = ?1, parent_ip_ids = ?2, license_terms_ids = ?3, updated_at = ?4
             WHERE job_id = ?5",
            params![
                publish_type,
                to_json_string_vec(parent_ip_ids),
                to_json_string_vec(license_terms_ids),
                now(),
                job_id,
            ],
        )?;
        Ok(())
    }

    fn set_preflight_result(&self, job_id: &str, next: JobStatus, reason: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let policy_decision = match next {
            JobStatus::PolicyPassed => "pass",
            JobStatus::ManualReview => "manual_review",
            JobStatus::Rejected => "reject",
            JobStatus::Staged => "pending",
            _ => "pending",
        };
        let affected = conn.execute(
            "UPDATE music_publish_jobs SET status = ?1, preflight_reason = ?2, policy_decision = ?3, reason_code = ?4, updated_at = ?5
             WHERE job_id = ?6 AND status = ?7",
            params![
                next.as_str(),
                reason,
                policy_decision,
                reason,
                now(),
                job_id,
                JobStatus::Checking.as_str(),
            ],
        )?;
        Ok(affected == 1)
    }

    fn set_anchor_result(&self, job_id: &str, tx_hash: &str, block_number: u64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE music_publish_jobs SET status = ?1, anchor_tx_hash = ?2, anchor_block_number = ?3, updated_at = ?4
             WHERE job_id = ?5 AND status = ?6",
            params![
                JobStatus::Anchored.as_str(),
                tx_hash,
                block_number as i64,
                now(),
                job_id,
                JobStatus::Anchoring.as_str(),
            ],
        )?;
        Ok(affected == 1)
    }

    fn set_metadata(&self, job_id: &str, title: &str, artist: &str, album: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE music_publish_jobs SET title = ?1, artist = ?2, album = ?3, updated_at = ?4
             WHERE job_id = ?5",
            params![title, artist, album, now(), job_id],
        )?;
        Ok(affected == 1)
    }

    fn set_finalize_ids(&self, job_id: &str, track_id: &str, content_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE music_publish_jobs SET track_id = ?1, content_id = ?2, updated_at = ?3 WHERE job_id = ?4",
            params![track_id, content_id, now(), job_id],
        )?;
        Ok(())
    }

    fn set_register_result(
        &self,
        job_id: &str,
        tx_hash: &str,
        block_number: u64,
        story_ip_id: &str,
        story_token_id: &str,
        story_license_terms_ids: &[String],
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE music_publish_jobs SET status = ?1, register_tx_hash = ?2, register_block_number = ?3,
                story_ip_id = ?4, story_token_id = ?5, story_license_terms_ids = ?6, updated_at = ?7
             WHERE job_id = ?8 AND status = ?9",
            params![
                JobStatus::Registered.as_str(),
                tx_hash,
                block_number as i64,
                story_ip_id,
                story_token_id,
                to_json_string_vec(Some(story_license_terms_ids)),
                now(),
                job_id,
                JobStatus::Registering.as_str(),
            ],
        )?;
        Ok(affected == 1)
    }

    fn set_finalize_result(&self, job_id: &str, finalize_tx_hash: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE music_publish_jobs SET finalize_tx_hash = COALESCE(?1, finalize_tx_hash), updated_at = ?2
             WHERE job_id = ?3",
            params![finalize_tx_hash, now(), job_id],
        )?;
        Ok(())
    }

    fn set_error(&self, job_id: &str, error_code: &str, error_message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let truncated: String = error_message.chars().take(1024).collect();
        conn.execute(
            "UPDATE music_publish_jobs SET error_code = ?1, error_message = ?2, updated_at = ?3 WHERE job_id = ?4",
            params![error_code, truncated, now(), job_id],
        )?;
        Ok(())
    }

    fn usage_since(&self, user_address: &str, since_unix: i64) -> Result<(u32, u64)> {
        let conn = self.conn.lock().unwrap();
        let (count, bytes): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(audio_bytes) FROM music_publish_jobs
             WHERE user_address = ?1 AND created_at >= ?2 AND status != ?3",
            params![user_address, since_unix, JobStatus::Rejected.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((count as u32, bytes.unwrap_or(0) as u64))
    }
}

pub fn require_job(job: Option<PublishJob>, job_id: &str) -> Result<PublishJob, PublishError> {
    job.ok_or_else(|| PublishError::NotFound(job_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_job_round_trips() {
        let store = SqlitePublishJobStore::in_memory().unwrap();
        let job = store.create_job("0xabc", "Title", "Artist", "Album").unwrap();
        let fetched = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Staged);
        assert_eq!(fetched.title.as_deref(), Some("Title"));
    }

    #[test]
    fn transition_only_succeeds_from_expected_status() {
        let store = SqlitePublishJobStore::in_memory().unwrap();
        let job = store.create_job("0xabc", "Title", "Artist", "Album").unwrap();

        let ok = store
            .transition(&job.job_id, &[JobStatus::Staged], JobStatus::Checking)
            .unwrap();
        assert!(ok);

        // Second transition from the now-stale expected status is a no-op, not an error.
        let ok2 = store
            .transition(&job.job_id, &[JobStatus::Staged], JobStatus::Checking)
            .unwrap();
        assert!(!ok2);

        let fetched = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Checking);
    }

    #[test]
    fn concurrent_transition_only_one_winner() {
        let store = std::sync::Arc::new(SqlitePublishJobStore::in_memory().unwrap());
        let job = store.create_job("0xabc", "Title", "Artist", "Album").unwrap();

        let results: Vec<bool> = (0..5)
            .map(|_| {
                store
                    .transition(&job.job_id, &[JobStatus::Staged], JobStatus::Checking)
                    .unwrap()
            })
            .collect();
        assert_eq!(results.iter().filter(|&&ok| ok).count(), 1);
    }

    #[test]
    fn usage_since_excludes_rejected_jobs() {
        let store = SqlitePublishJobStore::in_memory().unwrap();
        let job1 = store.create_job("0xabc", "A", "B", "C").unwrap();
        store
            .stage_artifacts(&job1.job_id, Some("cid1"), None, None, Some(1000))
            .unwrap();
        let job2 = store.create_job("0xabc", "A2", "B2", "C2").unwrap();
        store
            .stage_artifacts(&job2.job_id, Some("cid2"), None, None, Some(2000))
            .unwrap();
        store
            .transition(&job2.job_id, &[JobStatus::Staged], JobStatus::Checking)
            .unwrap();
        store
            .set_preflight_result(&job2.job_id, JobStatus::Rejected, Some("bad"))
            .unwrap();

        let (count, bytes) = store.usage_since("0xabc", 0).unwrap();
        assert_eq!(count, 1);
        assert_eq!(bytes, 1000);
    }
}
