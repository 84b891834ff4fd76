//! Access to the external kintone record store.
//!
//! Records travel in kintone's wire shape: a JSON object keyed by field code,
//! each entry holding `{"type": ..., "value": ...}` on reads and `{"value": ...}`
//! on writes. Translation into domain models happens in [`mapping`].

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod client;
pub mod mapping;
pub mod query;

pub use client::KintoneClient;
pub use query::{Condition, RecordQuery, SortOrder};

pub type Record = Map<String, Value>;

/// Field code kintone assigns to the record number.
pub const RECORD_ID_FIELD: &str = "$id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum App {
    Jobs,
    Talents,
    Applications,
    Inquiries,
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            App::Jobs => "jobs",
            App::Talents => "talents",
            App::Applications => "applications",
            App::Inquiries => "inquiries",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<Record>,
    /// Present only when the query asked for it.
    pub total_count: Option<u64>,
}

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("record store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("record store returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected record store response: {0}")]
    Decode(String),
    #[error("invalid record store url: {0}")]
    Url(#[from] url::ParseError),
}

pub type StoreResult<T> = Result<T, RecordStoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn get_records(
        &self,
        app: App,
        query: &RecordQuery,
        fields: &[&str],
    ) -> StoreResult<RecordPage>;

    async fn get_record(&self, app: App, id: u64) -> StoreResult<Option<Record>>;

    /// Returns the id assigned to the new record.
    async fn add_record(&self, app: App, record: Record) -> StoreResult<u64>;

    async fn update_record(&self, app: App, id: u64, record: Record) -> StoreResult<()>;

    /// Uploads a file to temporary storage and returns its file key.
    async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<String>;

    async fn download_file(&self, file_key: &str) -> StoreResult<Vec<u8>>;
}

/// Reads the `$id` of a record as returned by the store.
pub fn record_id(record: &Record) -> Option<u64> {
    match record.get(RECORD_ID_FIELD)?.get("value")? {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}
