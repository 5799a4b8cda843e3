use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the portal's record store
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RecordStoreError {
    /// A record with the same natural key already exists
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The backing store failed
    #[error("record store failure: {0}")]
    Backend(String),
}

/// Result type for record store operations
pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

/// A prepaid access voucher. On the router it becomes a hotspot user whose
/// name and password are both `code`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voucher {
    pub id: u64,
    pub code: String,
    pub data_plan: String,
    pub status: String,
    pub created_by: String,
    pub valid_days: u32,
    pub ship_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A bandwidth plan. On the router it becomes a hotspot user profile named
/// `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandwidthPlan {
    pub id: u64,
    pub name: String,
    /// Kbps
    pub upload_speed: u32,
    /// Kbps
    pub download_speed: u32,
    pub burst_limit: Option<String>,
    pub burst_threshold: Option<String>,
    pub burst_time: Option<String>,
    pub priority: Option<u8>,
    pub limit_at: Option<String>,
    pub status: String,
    pub ship_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// RecordStore defines the port for committing portal records.
///
/// Ids passed in are ignored; the store assigns them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_voucher(&self, voucher: Voucher) -> RecordStoreResult<Voucher>;

    async fn list_vouchers(&self) -> RecordStoreResult<Vec<Voucher>>;

    async fn insert_plan(&self, plan: BandwidthPlan) -> RecordStoreResult<BandwidthPlan>;

    async fn list_plans(&self) -> RecordStoreResult<Vec<BandwidthPlan>>;
}
