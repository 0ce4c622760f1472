//! Job status, metrics and input persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{JobInputRecord, JobMetricsRecord, JobStatusRecord, NewJobStatus};
use super::pool::{DbPool, DieselError};
use crate::models::{JobMetrics, JobPhase, JobRecord, PairInput, TimeMetrics};
use crate::outcome::JobStatus;
use crate::schema::{job_inputs, job_metrics, job_status};
use crate::with_conn;

/// Stored timestamps are RFC 3339.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DieselError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| deserialization_error(format!("Invalid timestamp '{}': {}", s, e)))
}

fn deserialization_error(message: String) -> DieselError {
    DieselError::DeserializationError(message.into())
}

impl TryFrom<JobStatusRecord> for JobRecord {
    type Error = DieselError;

    fn try_from(record: JobStatusRecord) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&record.status).ok_or_else(|| {
            deserialization_error(format!("Invalid job status: '{}'", record.status))
        })?;
        let identifiers: BTreeMap<String, String> = serde_json::from_str(&record.identifiers)
            .map_err(|e| DieselError::DeserializationError(Box::new(e)))?;
        let raw_phases: BTreeMap<String, f64> = serde_json::from_str(&record.elapsed_by_phase)
            .map_err(|e| DieselError::DeserializationError(Box::new(e)))?;

        let mut elapsed_by_phase = BTreeMap::new();
        for (name, seconds) in raw_phases {
            let phase = JobPhase::from_str(&name)
                .ok_or_else(|| deserialization_error(format!("Invalid phase: '{}'", name)))?;
            elapsed_by_phase.insert(phase, seconds);
        }

        let datetime_start = parse_datetime(&record.datetime_start)?;
        let datetime_end = record
            .datetime_end
            .as_deref()
            .map(parse_datetime)
            .transpose()?;

        Ok(JobRecord::restore(
            record.job_id,
            identifiers,
            status,
            record.location,
            datetime_start,
            datetime_end,
            record.checksum,
            record.size,
            record.host,
            elapsed_by_phase,
        ))
    }
}

impl From<JobInputRecord> for PairInput {
    fn from(record: JobInputRecord) -> Self {
        PairInput {
            id: record.id,
            case_id: record.case_id,
            tumor_id: record.tumor_id,
            normal_id: record.normal_id,
            tumor_url: record.tumor_url,
            normal_url: record.normal_url,
        }
    }
}

impl From<JobMetricsRecord> for JobMetrics {
    fn from(record: JobMetricsRecord) -> Self {
        let average = match (
            record.user_time,
            record.system_time,
            record.wall_clock,
            record.percent_of_cpu,
            record.maximum_resident_set_size,
        ) {
            (Some(user_time), Some(system_time), Some(wall_clock), Some(cpu), Some(rss)) => {
                Some(TimeMetrics {
                    user_time,
                    system_time,
                    wall_clock,
                    percent_of_cpu: cpu,
                    maximum_resident_set_size: rss,
                })
            }
            _ => None,
        };

        JobMetrics {
            job_id: record.job_id,
            case_id: record.case_id,
            status: record.status,
            thread_count: record.thread_count,
            block_count: record.block_count,
            download_seconds: record.download_seconds,
            upload_seconds: record.upload_seconds,
            total_seconds: record.total_seconds,
            average,
        }
    }
}

/// Where finished jobs and their metrics are recorded.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Write a finished record. Records are inserted once, never updated.
    async fn persist_job(&self, record: &JobRecord) -> Result<(), DieselError>;

    async fn persist_metrics(&self, metrics: &JobMetrics) -> Result<(), DieselError>;

    /// Inputs with no `COMPLETED` job for their tumor/normal pair.
    async fn pending_inputs(&self, limit: Option<i64>) -> Result<Vec<PairInput>, DieselError>;

    /// Most recently started jobs first.
    async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRecord>, DieselError>;
}

/// Diesel-backed job repository.
#[derive(Clone)]
pub struct DieselJobRepository {
    pool: DbPool,
}

impl DieselJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert inputs, skipping ids that already exist. Returns rows added.
    pub async fn import_inputs(&self, inputs: &[PairInput]) -> Result<usize, DieselError> {
        let created_at = Utc::now().to_rfc3339();
        let records: Vec<JobInputRecord> = inputs
            .iter()
            .map(|input| JobInputRecord {
                id: input.id.clone(),
                case_id: input.case_id.clone(),
                tumor_id: input.tumor_id.clone(),
                normal_id: input.normal_id.clone(),
                tumor_url: input.tumor_url.clone(),
                normal_url: input.normal_url.clone(),
                created_at: created_at.clone(),
            })
            .collect();

        with_conn!(self.pool, conn, {
            let mut inserted = 0;
            for record in &records {
                inserted += diesel::insert_into(job_inputs::table)
                    .values(record)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await?;
            }
            Ok(inserted)
        })
    }

    pub async fn get_input(&self, id: &str) -> Result<Option<PairInput>, DieselError> {
        with_conn!(self.pool, conn, {
            job_inputs::table
                .find(id)
                .first::<JobInputRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(PairInput::from))
        })
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, DieselError> {
        with_conn!(self.pool, conn, {
            job_status::table
                .find(job_id)
                .first::<JobStatusRecord>(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(JobRecord::try_from).transpose())
        })
    }

    pub async fn get_metrics(&self, job_id: &str) -> Result<Option<JobMetrics>, DieselError> {
        with_conn!(self.pool, conn, {
            job_metrics::table
                .find(job_id)
                .first::<JobMetricsRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(JobMetrics::from))
        })
    }
}

#[async_trait]
impl StatusStore for DieselJobRepository {
    async fn persist_job(&self, record: &JobRecord) -> Result<(), DieselError> {
        let identifiers = serde_json::to_string(record.identifiers())
            .map_err(|e| DieselError::SerializationError(Box::new(e)))?;
        let phases: BTreeMap<&str, f64> = record
            .elapsed_by_phase()
            .iter()
            .map(|(phase, secs)| (phase.as_str(), *secs))
            .collect();
        let elapsed_by_phase = serde_json::to_string(&phases)
            .map_err(|e| DieselError::SerializationError(Box::new(e)))?;
        let datetime_start = record.datetime_start().to_rfc3339();
        let datetime_end = record.datetime_end().map(|dt| dt.to_rfc3339());

        let row = NewJobStatus {
            job_id: record.job_id(),
            input_id: record.identifier("input_id"),
            case_id: record.identifier("case_id"),
            tumor_id: record.identifier("tumor_id"),
            normal_id: record.identifier("normal_id"),
            identifiers: &identifiers,
            status: record.status().as_str(),
            location: record.location(),
            datetime_start: &datetime_start,
            datetime_end: datetime_end.as_deref(),
            checksum: record.checksum(),
            size: record.size(),
            host: record.host(),
            elapsed_by_phase: &elapsed_by_phase,
        };

        with_conn!(self.pool, conn, {
            diesel::insert_into(job_status::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    async fn persist_metrics(&self, metrics: &JobMetrics) -> Result<(), DieselError> {
        let avg = metrics.average;
        let row = JobMetricsRecord {
            job_id: metrics.job_id.clone(),
            case_id: metrics.case_id.clone(),
            status: metrics.status.clone(),
            thread_count: metrics.thread_count,
            block_count: metrics.block_count,
            download_seconds: metrics.download_seconds,
            upload_seconds: metrics.upload_seconds,
            total_seconds: metrics.total_seconds,
            user_time: avg.map(|m| m.user_time),
            system_time: avg.map(|m| m.system_time),
            wall_clock: avg.map(|m| m.wall_clock),
            percent_of_cpu: avg.map(|m| m.percent_of_cpu),
            maximum_resident_set_size: avg.map(|m| m.maximum_resident_set_size),
            created_at: Utc::now().to_rfc3339(),
        };

        with_conn!(self.pool, conn, {
            diesel::insert_into(job_metrics::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    async fn pending_inputs(&self, limit: Option<i64>) -> Result<Vec<PairInput>, DieselError> {
        let mut sql = String::from(
            "SELECT i.id, i.case_id, i.tumor_id, i.normal_id, i.tumor_url, i.normal_url, i.created_at \
             FROM job_inputs i \
             WHERE NOT EXISTS (\
                 SELECT 1 FROM job_status s \
                 WHERE s.tumor_id = i.tumor_id AND s.normal_id = i.normal_id \
                 AND s.status = 'COMPLETED') \
             ORDER BY i.id",
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        with_conn!(self.pool, conn, {
            let rows: Vec<JobInputRecord> = diesel::sql_query(&sql).load(&mut conn).await?;
            Ok(rows.into_iter().map(PairInput::from).collect())
        })
    }

    async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobRecord>, DieselError> {
        with_conn!(self.pool, conn, {
            job_status::table
                .order(job_status::datetime_start.desc())
                .limit(limit)
                .load::<JobStatusRecord>(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(JobRecord::try_from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{classify, Outcome};
    use crate::repository::run_migrations;

    async fn repo() -> (tempfile::TempDir, DieselJobRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("jobs.db").display().to_string();
        run_migrations(&url).await.unwrap();
        let pool = DbPool::from_url(&url).unwrap();
        (dir, DieselJobRepository::new(pool))
    }

    fn input(id: &str, tumor: &str, normal: &str) -> PairInput {
        PairInput {
            id: id.into(),
            case_id: format!("case-{}", id),
            tumor_id: tumor.into(),
            normal_id: normal.into(),
            tumor_url: format!("s3://bucket/{}.bam", tumor),
            normal_url: format!("s3://bucket/{}.bam", normal),
        }
    }

    fn finished(input: &PairInput, outcome: Outcome) -> JobRecord {
        let mut record = JobRecord::new(input.identifiers());
        record.start().unwrap();
        record
            .record_phase(JobPhase::Download, std::time::Duration::from_secs(3))
            .unwrap();
        record.finish(&outcome).unwrap();
        record
    }

    fn stored_row(datetime_start: &str, datetime_end: Option<&str>) -> JobStatusRecord {
        JobStatusRecord {
            job_id: "job-1".into(),
            input_id: None,
            case_id: None,
            tumor_id: None,
            normal_id: None,
            identifiers: "{}".into(),
            status: "COMPLETED".into(),
            location: None,
            datetime_start: datetime_start.into(),
            datetime_end: datetime_end.map(String::from),
            checksum: None,
            size: None,
            host: None,
            elapsed_by_phase: "{}".into(),
        }
    }

    #[test]
    fn test_corrupt_timestamps_are_rejected() {
        let ok = "2024-05-01T12:00:00+00:00";
        assert!(JobRecord::try_from(stored_row(ok, Some(ok))).is_ok());
        assert!(JobRecord::try_from(stored_row(ok, None)).is_ok());

        let bad_start = JobRecord::try_from(stored_row("yesterday", None));
        assert!(matches!(bad_start, Err(DieselError::DeserializationError(_))));
        let bad_end = JobRecord::try_from(stored_row(ok, Some("")));
        assert!(matches!(bad_end, Err(DieselError::DeserializationError(_))));
    }

    #[tokio::test]
    async fn test_import_skips_duplicates() {
        let (_dir, repo) = repo().await;
        let a = input("1", "t1", "n1");
        assert_eq!(repo.import_inputs(&[a.clone()]).await.unwrap(), 1);
        assert_eq!(
            repo.import_inputs(&[a.clone(), input("2", "t2", "n2")])
                .await
                .unwrap(),
            1
        );
        assert_eq!(repo.get_input("1").await.unwrap(), Some(a));
        assert_eq!(repo.get_input("9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_excludes_completed_pairs() {
        let (_dir, repo) = repo().await;
        let done = input("1", "t1", "n1");
        let failed = input("2", "t2", "n2");
        let fresh = input("3", "t3", "n3");
        repo.import_inputs(&[done.clone(), failed.clone(), fresh.clone()])
            .await
            .unwrap();

        repo.persist_job(&finished(&done, classify(&[0, 0], &[0], 0, "s3://o/1")))
            .await
            .unwrap();
        repo.persist_job(&finished(&failed, classify(&[0, 0], &[1], 0, "s3://o/2")))
            .await
            .unwrap();

        let pending = repo.pending_inputs(None).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let limited = repo.pending_inputs(Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_job_record_round_trip() {
        let (_dir, repo) = repo().await;
        let pair = input("1", "t1", "n1");
        let record = finished(&pair, classify(&[0, 0], &[0], 1, "s3://o/1"));
        repo.persist_job(&record).await.unwrap();

        let stored = repo.get_job(record.job_id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), &JobStatus::UploadFailure);
        assert_eq!(stored.location(), Some("Not Applicable"));
        assert_eq!(stored.identifier("tumor_id"), Some("t1"));
        assert_eq!(stored.elapsed(JobPhase::Download), 3.0);
        assert_eq!(stored.lifecycle(), crate::models::Lifecycle::Persisted);

        // Same job id cannot be written twice.
        assert!(repo.persist_job(&record).await.is_err());

        let recent = repo.recent_jobs(10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_round_trip() {
        let (_dir, repo) = repo().await;
        let metrics = JobMetrics {
            job_id: "job-1".into(),
            case_id: Some("case-1".into()),
            status: "COMPLETED".into(),
            thread_count: 8,
            block_count: 4,
            download_seconds: 1.5,
            upload_seconds: 0.5,
            total_seconds: 10.0,
            average: Some(TimeMetrics {
                user_time: 1.0,
                system_time: 0.5,
                wall_clock: 2.0,
                percent_of_cpu: 75.0,
                maximum_resident_set_size: 1024.0,
            }),
        };
        repo.persist_metrics(&metrics).await.unwrap();
        assert_eq!(repo.get_metrics("job-1").await.unwrap(), Some(metrics));
    }
}
