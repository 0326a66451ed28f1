//! Redis-backed job store.
//!
//! Layout:
//! - `{prefix}:job:{id}`: hash with `data` (JSON record) and `rev`
//! - `{prefix}:status:{status}`: sorted set of job ids scored by `created_at` millis
//!
//! Insert and compare-and-swap run as Lua scripts, so the revision check,
//! the record write and the status index move happen atomically on the server.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::{debug, info_span, Instrument};

use clipstudio_models::{Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_operation;
use crate::store::{finish_scan, JobFilter, JobStore};

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "clipstudio";

// KEYS[1] = job hash, KEYS[2] = status index
// ARGV[1] = data, ARGV[2] = rev, ARGV[3] = score, ARGV[4] = id
const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[1], 'rev', ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
return 1
"#;

// KEYS[1] = job hash, KEYS[2] = old status index, KEYS[3] = new status index
// ARGV[1] = expected rev, ARGV[2] = data, ARGV[3] = new rev, ARGV[4] = id, ARGV[5] = score
// Returns -1 if missing, 0 on revision mismatch, 1 when written.
const CAS_SCRIPT: &str = r#"
local rev = redis.call('HGET', KEYS[1], 'rev')
if not rev then
    return -1
end
if rev ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[2], 'rev', ARGV[3])
if KEYS[2] ~= KEYS[3] then
    redis.call('ZREM', KEYS[2], ARGV[4])
    redis.call('ZADD', KEYS[3], ARGV[5], ARGV[4])
end
return 1
"#;

/// Job store client for Redis (or Valkey).
pub struct RedisJobStore {
    client: redis::Client,
    prefix: String,
    insert_script: Script,
    cas_script: Script,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisJobStore {
    /// Create a new store. Does not connect until the first operation.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
            insert_script: Script::new(INSERT_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        })
    }

    /// Key of a job hash.
    pub fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    /// Key of a status index.
    pub fn status_key(&self, status: JobStatus) -> String {
        format!("{}:status:{}", self.prefix, status)
    }

    fn score(job: &Job) -> i64 {
        job.created_at.timestamp_millis()
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn instrumented<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let span = info_span!("store_request", backend = "redis", operation = %operation);
        let start = Instant::now();
        let result = fut.instrument(span).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_not_found() => "not_found",
            Err(e) if e.is_conflict() => "conflict",
            Err(_) => "error",
        };
        record_operation("redis", operation, outcome, start.elapsed().as_secs_f64());

        result
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, mut job: Job) -> StoreResult<Job> {
        self.instrumented("insert", async {
            let mut conn = self.connection().await?;
            job.revision = 1;
            let data = serde_json::to_string(&job)?;

            let mut invocation = self.insert_script.prepare_invoke();
            invocation
                .key(self.job_key(&job.id))
                .key(self.status_key(job.status))
                .arg(data)
                .arg(job.revision)
                .arg(Self::score(&job))
                .arg(job.id.as_str());
            let inserted: i64 = invocation.invoke_async(&mut conn).await?;

            if inserted == 0 {
                return Err(StoreError::AlreadyExists(job.id.to_string()));
            }
            debug!(job_id = %job.id, "Inserted job");
            Ok(job)
        })
        .await
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        self.instrumented("get", async {
            let mut conn = self.connection().await?;
            let data: Option<String> = conn.hget(self.job_key(id), "data").await?;
            match data {
                Some(data) => Ok(serde_json::from_str(&data)?),
                None => Err(StoreError::not_found(id.as_str())),
            }
        })
        .await
    }

    async fn compare_and_swap(&self, current: &Job, mut next: Job) -> StoreResult<Job> {
        self.instrumented("compare_and_swap", async {
            if next.id != current.id {
                return Err(StoreError::Serialization(format!(
                    "record id changed from {} to {}",
                    current.id, next.id
                )));
            }

            let mut conn = self.connection().await?;
            next.revision = current.revision + 1;
            let data = serde_json::to_string(&next)?;

            let mut invocation = self.cas_script.prepare_invoke();
            invocation
                .key(self.job_key(&current.id))
                .key(self.status_key(current.status))
                .key(self.status_key(next.status))
                .arg(current.revision)
                .arg(data)
                .arg(next.revision)
                .arg(current.id.as_str())
                .arg(Self::score(&next));
            let written: i64 = invocation.invoke_async(&mut conn).await?;

            match written {
                1 => Ok(next),
                0 => Err(StoreError::conflict(format!(
                    "{} (expected revision {})",
                    current.id, current.revision
                ))),
                _ => Err(StoreError::not_found(current.id.as_str())),
            }
        })
        .await
    }

    async fn scan(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        self.instrumented("scan", async {
            if filter.limit == Some(0) {
                return Ok(Vec::new());
            }

            let mut conn = self.connection().await?;
            let statuses: Vec<JobStatus> = match filter.status {
                Some(status) => vec![status],
                None => JobStatus::ALL.to_vec(),
            };

            // The index is ordered by creation time, so a plain status scan
            // with a limit only needs the head of the set.
            let stop: isize = match (filter.status, filter.limit, filter.heartbeat_before) {
                (Some(_), Some(limit), None) => limit as isize - 1,
                _ => -1,
            };

            let mut ids: Vec<String> = Vec::new();
            for status in statuses {
                let members: Vec<String> = conn.zrange(self.status_key(status), 0, stop).await?;
                ids.extend(members);
            }
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let mut pipe = redis::pipe();
            for id in &ids {
                pipe.hget(self.job_key(&JobId::from(id.as_str())), "data");
            }
            let rows: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

            // The index may briefly lag the record; the filter re-checks status.
            let mut jobs = Vec::with_capacity(rows.len());
            for row in rows.into_iter().flatten() {
                let job: Job = serde_json::from_str(&row)?;
                if filter.matches(&job) {
                    jobs.push(job);
                }
            }

            Ok(finish_scan(jobs, filter))
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.instrumented("ping", async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
