use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::jobs::Job;
use super::locks::KeyedLocks;
use super::talents::Talent;
use super::{ServiceError, ServiceResult};
use crate::cache::{cache_key, CacheNamespace, RecordCache};
use crate::kintone::mapping::{field, Coercion, FieldMap, FieldSpec};
use crate::kintone::{App, Condition, RecordQuery, RecordStore, SortOrder, RECORD_ID_FIELD};

/// kintone caps a single page at 500 records.
const MAX_APPLICATIONS_PER_USER: u32 = 500;

pub mod fields {
    pub const AUTH_USER_ID: &str = "auth_user_id";
    pub const TALENT_ID: &str = "人材ID";
    pub const TALENT_NAME: &str = "氏名";
    pub const JOB_ID: &str = "案件ID";
    pub const JOB_TITLE: &str = "案件名";
    pub const STATUS: &str = "対応状況";
    pub const APPLIED_AT: &str = "応募日時";
    pub const INTERVIEW_NOTIFIED_AT: &str = "面談通知日時";
}

pub const STATUS_APPLIED: &str = "応募済み";
pub const STATUS_INTERVIEW_SCHEDULED: &str = "面談確定";
pub const STATUS_DECLINED: &str = "見送り";

const APPLICATION_FIELDS: &[FieldSpec] = &[
    field(RECORD_ID_FIELD, "id", Coercion::Id),
    field(fields::AUTH_USER_ID, "auth_user_id", Coercion::Text),
    field(fields::TALENT_ID, "talent_id", Coercion::Number),
    field(fields::TALENT_NAME, "talent_name", Coercion::Text),
    field(fields::JOB_ID, "job_id", Coercion::Number),
    field(fields::JOB_TITLE, "job_title", Coercion::Text),
    field(fields::STATUS, "status", Coercion::Text),
    field(fields::APPLIED_AT, "applied_at", Coercion::Timestamp),
    field(
        fields::INTERVIEW_NOTIFIED_AT,
        "interview_notified_at",
        Coercion::Timestamp,
    ),
];

pub const APPLICATION_MAP: FieldMap = FieldMap::new(APPLICATION_FIELDS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    Applied,
    InterviewScheduling,
    InterviewScheduled,
    Contracted,
    Declined,
}

/// Staff-facing status string, its lifecycle state and the label shown to talent.
const STATUS_TABLE: [(&str, ApplicationStatus, &str); 6] = [
    (STATUS_APPLIED, ApplicationStatus::Applied, "応募済み"),
    ("書類選考中", ApplicationStatus::Applied, "選考中"),
    ("面談調整中", ApplicationStatus::InterviewScheduling, "面談調整中"),
    (STATUS_INTERVIEW_SCHEDULED, ApplicationStatus::InterviewScheduled, "面談予定"),
    ("成約", ApplicationStatus::Contracted, "契約成立"),
    (STATUS_DECLINED, ApplicationStatus::Declined, "見送り"),
];

impl ApplicationStatus {
    pub fn from_external(external: &str) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|(code, _, _)| *code == external)
            .map(|(_, status, _)| *status)
    }
}

/// Display label for an external status. Unknown strings pass through unchanged.
pub fn status_label(external: &str) -> &str {
    STATUS_TABLE
        .iter()
        .find(|(code, _, _)| *code == external)
        .map(|(_, _, label)| *label)
        .unwrap_or(external)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: u64,
    pub auth_user_id: Uuid,
    pub talent_id: Option<u64>,
    #[serde(default)]
    pub talent_name: String,
    pub job_id: u64,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub status: String,
    pub applied_at: Option<DateTime<Utc>>,
    pub interview_notified_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn status_kind(&self) -> Option<ApplicationStatus> {
        ApplicationStatus::from_external(&self.status)
    }

    pub fn status_label(&self) -> &str {
        status_label(&self.status)
    }
}

#[derive(Serialize)]
struct ApplicationWrite<'a> {
    auth_user_id: Uuid,
    talent_id: u64,
    talent_name: &'a str,
    job_id: u64,
    job_title: &'a str,
    status: &'a str,
    applied_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct NotifiedWrite {
    interview_notified_at: DateTime<Utc>,
}

pub struct ApplicationService {
    store: Arc<dyn RecordStore>,
    cache: Arc<RecordCache>,
    submissions: KeyedLocks<(u64, u64)>,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<RecordCache>) -> Self {
        Self {
            store,
            cache,
            submissions: KeyedLocks::new(),
        }
    }

    fn owner_key(auth_user_id: Uuid) -> String {
        cache_key("by_owner", &auth_user_id)
    }

    pub async fn list_by_owner(&self, auth_user_id: Uuid) -> ServiceResult<Vec<Application>> {
        let key = Self::owner_key(auth_user_id);
        if let Some(cached) = self
            .cache
            .get::<Vec<Application>>(CacheNamespace::Applications, &key)
        {
            return Ok(cached);
        }

        let query = RecordQuery::new()
            .filter(Condition::eq(fields::AUTH_USER_ID, auth_user_id))
            .order_by(fields::APPLIED_AT, SortOrder::Desc)
            .order_by(RECORD_ID_FIELD, SortOrder::Desc)
            .limit(MAX_APPLICATIONS_PER_USER);
        let applications = self.fetch(&query).await?;

        self.cache
            .set(CacheNamespace::Applications, &key, &applications);
        Ok(applications)
    }

    pub async fn applied_job_ids(&self, auth_user_id: Uuid) -> ServiceResult<Vec<u64>> {
        let mut ids: Vec<u64> = Vec::new();
        for application in self.list_by_owner(auth_user_id).await? {
            if !ids.contains(&application.job_id) {
                ids.push(application.job_id);
            }
        }
        Ok(ids)
    }

    /// Submits an application, rejecting a second live one for the same pair.
    ///
    /// Submissions for one (talent, job) pair are serialized in-process; the
    /// duplicate scan always reads upstream, never the cache.
    pub async fn create(&self, talent: &Talent, job: &Job) -> ServiceResult<Application> {
        let _guard = self.submissions.lock((talent.id, job.id)).await;

        let existing = RecordQuery::new()
            .filter(Condition::eq(fields::TALENT_ID, talent.id))
            .filter(Condition::eq(fields::JOB_ID, job.id))
            .filter(Condition::not_in(fields::STATUS, [STATUS_DECLINED]))
            .limit(1);
        if !self.fetch(&existing).await?.is_empty() {
            warn!(talent_id = talent.id, job_id = job.id, "duplicate application rejected");
            return Err(ServiceError::DuplicateApplication);
        }

        let applied_at = Utc::now().trunc_subsecs(0);
        let talent_name = talent.full_name();
        let record = APPLICATION_MAP.encode(&ApplicationWrite {
            auth_user_id: talent.auth_user_id,
            talent_id: talent.id,
            talent_name: &talent_name,
            job_id: job.id,
            job_title: &job.title,
            status: STATUS_APPLIED,
            applied_at,
        })?;
        let id = self.store.add_record(App::Applications, record).await?;
        self.cache.invalidate(
            CacheNamespace::Applications,
            &Self::owner_key(talent.auth_user_id),
        );
        info!(application_id = id, talent_id = talent.id, job_id = job.id, "application created");

        Ok(Application {
            id,
            auth_user_id: talent.auth_user_id,
            talent_id: Some(talent.id),
            talent_name,
            job_id: job.id,
            job_title: job.title.clone(),
            status: STATUS_APPLIED.to_string(),
            applied_at: Some(applied_at),
            interview_notified_at: None,
        })
    }

    /// Interview-scheduled applications the talent has not been told about yet.
    pub async fn pending_interview_notices(
        &self,
        auth_user_id: Uuid,
    ) -> ServiceResult<Vec<Application>> {
        let query = RecordQuery::new()
            .filter(Condition::eq(fields::AUTH_USER_ID, auth_user_id))
            .filter(Condition::is_in(fields::STATUS, [STATUS_INTERVIEW_SCHEDULED]))
            .filter(Condition::eq(fields::INTERVIEW_NOTIFIED_AT, ""))
            .order_by(RECORD_ID_FIELD, SortOrder::Asc)
            .limit(MAX_APPLICATIONS_PER_USER);
        let mut pending = self.fetch(&query).await?;
        pending.retain(|application| application.interview_notified_at.is_none());
        Ok(pending)
    }

    pub async fn acknowledge_interview(
        &self,
        auth_user_id: Uuid,
        application_id: u64,
    ) -> ServiceResult<Application> {
        let record = self
            .store
            .get_record(App::Applications, application_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let mut application: Application = APPLICATION_MAP.decode(&record)?;
        if application.auth_user_id != auth_user_id {
            return Err(ServiceError::NotFound);
        }
        if application.interview_notified_at.is_some() {
            return Ok(application);
        }

        let notified_at = Utc::now().trunc_subsecs(0);
        let record = APPLICATION_MAP.encode(&NotifiedWrite {
            interview_notified_at: notified_at,
        })?;
        self.store
            .update_record(App::Applications, application_id, record)
            .await?;
        self.cache
            .invalidate(CacheNamespace::Applications, &Self::owner_key(auth_user_id));

        application.interview_notified_at = Some(notified_at);
        Ok(application)
    }

    async fn fetch(&self, query: &RecordQuery) -> ServiceResult<Vec<Application>> {
        let page = self
            .store
            .get_records(App::Applications, query, &APPLICATION_MAP.external_codes())
            .await?;
        Ok(APPLICATION_MAP.decode_all(&page.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_status_has_exactly_one_label() {
        let expected = [
            ("応募済み", "応募済み"),
            ("書類選考中", "選考中"),
            ("面談調整中", "面談調整中"),
            ("面談確定", "面談予定"),
            ("成約", "契約成立"),
            ("見送り", "見送り"),
        ];
        for (external, label) in expected {
            assert_eq!(status_label(external), label);
            assert_eq!(
                STATUS_TABLE.iter().filter(|(code, _, _)| *code == external).count(),
                1
            );
        }
    }

    #[test]
    fn unknown_status_passes_through() {
        assert_eq!(status_label("保留"), "保留");
        assert_eq!(status_label(""), "");
        assert_eq!(ApplicationStatus::from_external("保留"), None);
    }

    #[test]
    fn external_status_maps_to_lifecycle() {
        assert_eq!(
            ApplicationStatus::from_external("面談確定"),
            Some(ApplicationStatus::InterviewScheduled)
        );
        assert_eq!(
            ApplicationStatus::from_external("書類選考中"),
            Some(ApplicationStatus::Applied)
        );
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::InterviewScheduling).unwrap(),
            "\"interview-scheduling\""
        );
    }

    #[test]
    fn new_applications_encode_lookup_fields() {
        let applied_at = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let record = APPLICATION_MAP
            .encode(&ApplicationWrite {
                auth_user_id: Uuid::nil(),
                talent_id: 4,
                talent_name: "山田 太郎",
                job_id: 9,
                job_title: "Rust エンジニア",
                status: STATUS_APPLIED,
                applied_at,
            })
            .unwrap();

        assert_eq!(record[fields::JOB_ID]["value"], "9");
        assert_eq!(record[fields::STATUS]["value"], "応募済み");
        assert_eq!(record[fields::APPLIED_AT]["value"], "2024-05-01T10:00:00Z");
        assert!(!record.contains_key(fields::INTERVIEW_NOTIFIED_AT));
    }
}
