use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ServiceError, ServiceResult};
use crate::cache::{cache_key, CacheNamespace, RecordCache};
use crate::kintone::mapping::{field, Coercion, FieldMap, FieldSpec};
use crate::kintone::{App, Condition, RecordQuery, RecordStore, SortOrder, RECORD_ID_FIELD};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
/// Upper bound on ids per `in (...)` clause.
const ID_BATCH_SIZE: usize = 100;
/// kintone rejects `offset` values above this.
const MAX_OFFSET: u32 = 10_000;

pub mod fields {
    pub const TITLE: &str = "案件名";
    pub const POSITIONS: &str = "職種";
    pub const SKILLS: &str = "スキル";
    pub const FEATURES: &str = "特徴";
    pub const LOCATION: &str = "勤務地";
    pub const RATE_MIN: &str = "単価下限";
    pub const RATE_MAX: &str = "単価上限";
    pub const DESCRIPTION: &str = "案件詳細";
    pub const LISTING_ELIGIBLE: &str = "AIマッチング";
    pub const PUBLICATION: &str = "公開ステータス";
    pub const CREATED_AT: &str = "作成日時";

    pub const ELIGIBLE_MARKER: &str = "対象";
    pub const PUBLISHED_MARKER: &str = "公開";
}

const JOB_FIELDS: &[FieldSpec] = &[
    field(RECORD_ID_FIELD, "id", Coercion::Id),
    field(fields::TITLE, "title", Coercion::Text),
    field(fields::POSITIONS, "positions", Coercion::Set),
    field(fields::SKILLS, "skills", Coercion::Set),
    field(fields::FEATURES, "features", Coercion::Set),
    field(fields::LOCATION, "location", Coercion::Text),
    field(fields::RATE_MIN, "rate_min", Coercion::Number),
    field(fields::RATE_MAX, "rate_max", Coercion::Number),
    field(fields::DESCRIPTION, "description", Coercion::Text),
    field(
        fields::LISTING_ELIGIBLE,
        "listing_eligible",
        Coercion::Flag(fields::ELIGIBLE_MARKER),
    ),
    field(
        fields::PUBLICATION,
        "published",
        Coercion::Flag(fields::PUBLISHED_MARKER),
    ),
    field(fields::CREATED_AT, "created_at", Coercion::Timestamp),
];

pub const JOB_MAP: FieldMap = FieldMap::new(JOB_FIELDS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub positions: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub location: Option<String>,
    pub rate_min: Option<i64>,
    pub rate_max: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub listing_eligible: bool,
    #[serde(default)]
    pub published: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSort {
    #[default]
    New,
    Price,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSearch {
    pub query: Option<String>,
    pub loc: Option<String>,
    #[serde(default)]
    pub sort: JobSort,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// Who is listing: the public board sees published jobs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobScope {
    Public,
    Admin { eligible_only: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

pub struct JobService {
    store: Arc<dyn RecordStore>,
    cache: Arc<RecordCache>,
}

impl JobService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<RecordCache>) -> Self {
        Self { store, cache }
    }

    pub async fn search(&self, scope: JobScope, search: &JobSearch) -> ServiceResult<JobPage> {
        let page = search.page.unwrap_or(1);
        if page == 0 {
            return Err(ServiceError::Invalid("page must be 1 or greater".into()));
        }
        let size = search.size.unwrap_or(DEFAULT_PAGE_SIZE);
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(ServiceError::Invalid(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let normalized = JobSearch {
            query: non_blank(search.query.as_deref()),
            loc: non_blank(search.loc.as_deref()),
            sort: search.sort,
            page: Some(page),
            size: Some(size),
        };
        let key = cache_key("search", &(scope, &normalized));
        if let Some(cached) = self.cache.get::<JobPage>(CacheNamespace::Jobs, &key) {
            return Ok(cached);
        }

        // Pages past the upstream offset window are empty; one record is fetched for the count.
        let offset = page_offset(page, size);
        let query = match offset {
            Some(offset) => build_search_query(scope, &normalized).limit(size).offset(offset),
            None => build_search_query(scope, &normalized).limit(1),
        };
        let result = self
            .store
            .get_records(App::Jobs, &query, &JOB_MAP.external_codes())
            .await?;
        let items: Vec<Job> = match offset {
            Some(_) => JOB_MAP.decode_all(&result.records)?,
            None => Vec::new(),
        };
        let total = result.total_count.unwrap_or(items.len() as u64);

        debug!(?scope, page, size, total, returned = items.len(), "job search");
        let job_page = JobPage {
            items,
            total,
            page,
            size,
        };
        self.cache.set(CacheNamespace::Jobs, &key, &job_page);
        Ok(job_page)
    }

    pub async fn get_by_id(&self, id: u64) -> ServiceResult<Option<Job>> {
        let key = cache_key("by_id", &id);
        if let Some(cached) = self.cache.get::<Job>(CacheNamespace::Jobs, &key) {
            return Ok(Some(cached));
        }

        let Some(record) = self.store.get_record(App::Jobs, id).await? else {
            return Ok(None);
        };
        let job: Job = JOB_MAP.decode(&record)?;
        self.cache.set(CacheNamespace::Jobs, &key, &job);
        Ok(Some(job))
    }

    /// Resolves many ids with batched `$id in (...)` queries. Missing ids are absent from the map.
    pub async fn get_by_ids(&self, ids: &[u64]) -> ServiceResult<HashMap<u64, Job>> {
        let unique: BTreeSet<u64> = ids.iter().copied().collect();
        let mut found = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();

        for id in unique {
            match self
                .cache
                .get::<Job>(CacheNamespace::Jobs, &cache_key("by_id", &id))
            {
                Some(job) => {
                    found.insert(id, job);
                }
                None => misses.push(id),
            }
        }

        if misses.is_empty() {
            return Ok(found);
        }

        let codes = JOB_MAP.external_codes();
        let batches = misses.chunks(ID_BATCH_SIZE).map(|chunk| {
            let query = RecordQuery::new()
                .filter(Condition::is_in(RECORD_ID_FIELD, chunk))
                .limit(chunk.len() as u32);
            let store = self.store.clone();
            let codes = codes.clone();
            async move { store.get_records(App::Jobs, &query, &codes).await }
        });
        let pages = try_join_all(batches).await?;

        debug!(requested = misses.len(), batches = pages.len(), "batched job lookup");
        for page in pages {
            for job in JOB_MAP.decode_all::<Job>(&page.records)? {
                self.cache
                    .set(CacheNamespace::Jobs, &cache_key("by_id", &job.id), &job);
                found.insert(job.id, job);
            }
        }
        Ok(found)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Record offset for a 1-based page, or `None` when it falls outside what kintone serves.
fn page_offset(page: u32, size: u32) -> Option<u32> {
    page.checked_sub(1)?
        .checked_mul(size)
        .filter(|offset| *offset <= MAX_OFFSET)
}

fn build_search_query(scope: JobScope, search: &JobSearch) -> RecordQuery {
    let mut query = RecordQuery::new();

    match scope {
        JobScope::Public => {
            query = query.filter(Condition::is_in(
                fields::PUBLICATION,
                [fields::PUBLISHED_MARKER],
            ));
        }
        JobScope::Admin { eligible_only: true } => {
            query = query.filter(Condition::is_in(
                fields::LISTING_ELIGIBLE,
                [fields::ELIGIBLE_MARKER],
            ));
        }
        JobScope::Admin {
            eligible_only: false,
        } => {}
    }

    if let Some(text) = &search.query {
        for term in text.split_whitespace() {
            query = query.filter(Condition::Or(vec![
                Condition::like(fields::TITLE, term),
                Condition::like(fields::DESCRIPTION, term),
                Condition::like(fields::LOCATION, term),
            ]));
        }
    }

    if let Some(loc) = &search.loc {
        query = query.filter(Condition::like(fields::LOCATION, loc));
    }

    query = match search.sort {
        JobSort::New => query.order_by(fields::CREATED_AT, SortOrder::Desc),
        JobSort::Price => query.order_by(fields::RATE_MAX, SortOrder::Desc),
    };

    query
        .order_by(RECORD_ID_FIELD, SortOrder::Desc)
        .with_total_count()
}
