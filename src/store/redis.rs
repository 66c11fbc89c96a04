use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, RedisError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::{Job, JobPatch};

const JOB_KEY_PREFIX: &str = "render_jobs:job:";
const INDEX_KEY: &str = "render_jobs:index";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

fn job_key(id: Uuid) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

/// Inclusive `ZREVRANGE` bounds for a page, or `None` when the page starts
/// beyond anything a sorted set can index.
fn range_bounds(limit: usize, offset: usize) -> Option<(isize, isize)> {
    let start = isize::try_from(offset).ok()?;
    let stop = offset
        .checked_add(limit - 1)
        .and_then(|stop| isize::try_from(stop).ok())
        .unwrap_or(isize::MAX);
    Some((start, stop))
}

/// Redis-backed job store.
///
/// Each record is a JSON string written with `SETEX`, so a job nobody touches
/// for `ttl_secs` disappears on its own. A sorted set scored by creation time
/// provides the newest-first listing.
///
/// The connection is opened on first use. After an I/O failure it is dropped
/// and reopened on the next call, so a Redis restart heals without a service
/// restart.
pub struct RedisJobStore {
    client: ::redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    stale: AtomicBool,
    ttl_secs: u64,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            stale: AtomicBool::new(false),
            ttl_secs,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        {
            let mut cached = self.conn.lock().await;
            if self.stale.swap(false, Ordering::AcqRel) {
                *cached = None;
            }
            if let Some(conn) = cached.as_ref() {
                return Ok(conn.clone());
            }
        }

        // The lock is released while connecting. Callers that race here each
        // connect and the first one stored wins.
        let conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(RESPONSE_TIMEOUT, CONNECT_TIMEOUT)
            .await
            .map_err(StoreError::Redis)?;

        let mut cached = self.conn.lock().await;
        if cached.is_none() {
            tracing::debug!("Opened Redis connection for job store");
        }
        Ok(cached.get_or_insert(conn).clone())
    }

    /// Map a command failure, flagging the cached connection for replacement
    /// when the failure was at the transport level.
    fn broken(&self, e: RedisError) -> StoreError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
            self.stale.store(true, Ordering::Release);
        }
        StoreError::Redis(e)
    }

    async fn write(&self, conn: &mut MultiplexedConnection, job: &Job) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        let expired_before = Utc::now().timestamp_millis() - (self.ttl_secs as i64) * 1000;

        ::redis::pipe()
            .atomic()
            .set_ex(job_key(job.id), payload, self.ttl_secs)
            .ignore()
            .zadd(INDEX_KEY, job.id.to_string(), job.created_at.timestamp_millis())
            .ignore()
            .zrembyscore(INDEX_KEY, "-inf", expired_before)
            .ignore()
            .query_async::<()>(conn)
            .await
            .map_err(|e| self.broken(e))
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        self.write(&mut conn, job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(job_key(id)).await.map_err(|e| self.broken(e))?;
        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Option<Job>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(job_key(id)).await.map_err(|e| self.broken(e))?;
        let Some(payload) = raw else {
            return Ok(None);
        };

        // Read-merge-write. Only the owning supervisor writes a live job, so a
        // same-id race is rare and last-write-wins.
        let mut job: Job = serde_json::from_str(&payload)?;
        if job.apply(patch, Utc::now()) {
            self.write(&mut conn, &job).await?;
        }
        Ok(Some(job))
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Job>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some((start, stop)) = range_bounds(limit, offset) else {
            return Ok(Vec::new());
        };
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .zrevrange(INDEX_KEY, start, stop)
            .await
            .map_err(|e| self.broken(e))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| format!("{JOB_KEY_PREFIX}{id}")).collect();
        let payloads: Vec<Option<String>> = ::redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.broken(e))?;

        let mut jobs = Vec::with_capacity(payloads.len());
        let mut expired = Vec::new();
        for (id, payload) in ids.iter().zip(payloads) {
            match payload {
                Some(payload) => jobs.push(serde_json::from_str::<Job>(&payload)?),
                None => expired.push(id.clone()),
            }
        }

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Pruning expired jobs from index");
            conn.zrem::<_, _, ()>(INDEX_KEY, &expired)
                .await
                .map_err(|e| self.broken(e))?;
        }

        Ok(jobs)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let (removed, _): (u64, u64) = ::redis::pipe()
            .atomic()
            .del(job_key(id))
            .zrem(INDEX_KEY, id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| self.broken(e))?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| self.broken(e))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
