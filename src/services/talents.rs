use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::files::AttachedFile;
use super::{ServiceError, ServiceResult};
use crate::cache::{cache_key, CacheNamespace, RecordCache};
use crate::kintone::mapping::{field, Coercion, FieldMap, FieldSpec};
use crate::kintone::{App, Condition, RecordQuery, RecordStore, RECORD_ID_FIELD};

pub mod fields {
    pub const AUTH_USER_ID: &str = "auth_user_id";
    pub const LAST_NAME: &str = "姓";
    pub const FIRST_NAME: &str = "名";
    pub const LAST_NAME_KANA: &str = "セイ";
    pub const FIRST_NAME_KANA: &str = "メイ";
    pub const EMAIL: &str = "メールアドレス";
    pub const PHONE: &str = "電話番号";
    pub const SKILLS: &str = "スキル";
    pub const EXPERIENCE: &str = "経歴";
    pub const DESIRED_RATE: &str = "希望単価";
    pub const STATUS: &str = "ステータス";
    pub const RESUME_FILES: &str = "職務経歴書";
}

const TALENT_FIELDS: &[FieldSpec] = &[
    field(RECORD_ID_FIELD, "id", Coercion::Id),
    field(fields::AUTH_USER_ID, "auth_user_id", Coercion::Text),
    field(fields::LAST_NAME, "last_name", Coercion::Text),
    field(fields::FIRST_NAME, "first_name", Coercion::Text),
    field(fields::LAST_NAME_KANA, "last_name_kana", Coercion::Text),
    field(fields::FIRST_NAME_KANA, "first_name_kana", Coercion::Text),
    field(fields::EMAIL, "email", Coercion::Text),
    field(fields::PHONE, "phone", Coercion::Text),
    field(fields::SKILLS, "skills", Coercion::Text),
    field(fields::EXPERIENCE, "experience", Coercion::Text),
    field(fields::DESIRED_RATE, "desired_rate", Coercion::Number),
    field(fields::STATUS, "status", Coercion::Text),
    field(fields::RESUME_FILES, "resume_files", Coercion::Files),
];

pub const TALENT_MAP: FieldMap = FieldMap::new(TALENT_FIELDS);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TalentStatus {
    #[default]
    #[serde(rename = "アクティブ")]
    Active,
    #[serde(rename = "退会")]
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talent {
    pub id: u64,
    pub auth_user_id: Uuid,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub first_name: String,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub skills: Option<String>,
    pub experience: Option<String>,
    pub desired_rate: Option<i64>,
    #[serde(default)]
    pub status: TalentStatus,
    #[serde(default)]
    pub resume_files: Vec<AttachedFile>,
}

impl Talent {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTalent {
    pub last_name: String,
    pub first_name: String,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub phone: Option<String>,
    pub skills: Option<String>,
    pub experience: Option<String>,
    pub desired_rate: Option<i64>,
}

impl NewTalent {
    pub fn validate(&self) -> ServiceResult<()> {
        if self.last_name.trim().is_empty() || self.first_name.trim().is_empty() {
            return Err(ServiceError::Invalid("氏名を入力してください".into()));
        }
        if matches!(self.desired_rate, Some(rate) if rate < 0) {
            return Err(ServiceError::Invalid(
                "希望単価は0以上で入力してください".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct TalentWrite<'a> {
    auth_user_id: Uuid,
    email: &'a str,
    status: TalentStatus,
    #[serde(flatten)]
    profile: &'a NewTalent,
}

/// Partial profile edit. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TalentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name_kana: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name_kana: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_rate: Option<Option<i64>>,
}

impl TalentUpdate {
    pub fn is_empty(&self) -> bool {
        *self == TalentUpdate::default()
    }

    pub fn apply(&self, talent: &mut Talent) {
        if let Some(value) = &self.last_name {
            talent.last_name = value.clone();
        }
        if let Some(value) = &self.first_name {
            talent.first_name = value.clone();
        }
        if let Some(value) = &self.last_name_kana {
            talent.last_name_kana = value.clone();
        }
        if let Some(value) = &self.first_name_kana {
            talent.first_name_kana = value.clone();
        }
        if let Some(value) = &self.phone {
            talent.phone = value.clone();
        }
        if let Some(value) = &self.skills {
            talent.skills = value.clone();
        }
        if let Some(value) = &self.experience {
            talent.experience = value.clone();
        }
        if let Some(value) = self.desired_rate {
            talent.desired_rate = value;
        }
    }
}

#[derive(Serialize)]
struct StatusWrite {
    status: TalentStatus,
}

pub struct TalentService {
    store: Arc<dyn RecordStore>,
    cache: Arc<RecordCache>,
}

impl TalentService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<RecordCache>) -> Self {
        Self { store, cache }
    }

    pub(crate) fn cache_key(auth_user_id: Uuid) -> String {
        cache_key("by_auth_user", &auth_user_id)
    }

    pub async fn get_by_auth_user(&self, auth_user_id: Uuid) -> ServiceResult<Option<Talent>> {
        let key = Self::cache_key(auth_user_id);
        if let Some(cached) = self.cache.get::<Talent>(CacheNamespace::Talents, &key) {
            return Ok(Some(cached));
        }

        let talent = self.fetch_by_auth_user(auth_user_id).await?;
        if let Some(talent) = &talent {
            self.cache.set(CacheNamespace::Talents, &key, talent);
        }
        Ok(talent)
    }

    /// Uncached lookup, used before writes.
    pub async fn fetch_by_auth_user(&self, auth_user_id: Uuid) -> ServiceResult<Option<Talent>> {
        let query = RecordQuery::new()
            .filter(Condition::eq(fields::AUTH_USER_ID, auth_user_id))
            .limit(1);
        let page = self
            .store
            .get_records(App::Talents, &query, &TALENT_MAP.external_codes())
            .await?;
        match page.records.first() {
            Some(record) => Ok(Some(TALENT_MAP.decode(record)?)),
            None => Ok(None),
        }
    }

    pub async fn create(
        &self,
        auth_user_id: Uuid,
        email: &str,
        profile: NewTalent,
    ) -> ServiceResult<Talent> {
        profile.validate()?;
        if self.fetch_by_auth_user(auth_user_id).await?.is_some() {
            return Err(ServiceError::ProfileExists);
        }

        let record = TALENT_MAP.encode(&TalentWrite {
            auth_user_id,
            email,
            status: TalentStatus::Active,
            profile: &profile,
        })?;
        let id = self.store.add_record(App::Talents, record).await?;
        info!(talent_id = id, %auth_user_id, "talent profile created");

        let talent = Talent {
            id,
            auth_user_id,
            last_name: profile.last_name,
            first_name: profile.first_name,
            last_name_kana: profile.last_name_kana,
            first_name_kana: profile.first_name_kana,
            email: Some(email.to_string()),
            phone: profile.phone,
            skills: profile.skills,
            experience: profile.experience,
            desired_rate: profile.desired_rate,
            status: TalentStatus::Active,
            resume_files: Vec::new(),
        };
        self.cache
            .set(CacheNamespace::Talents, &Self::cache_key(auth_user_id), &talent);
        Ok(talent)
    }

    pub async fn update(&self, auth_user_id: Uuid, update: &TalentUpdate) -> ServiceResult<Talent> {
        let mut talent = self
            .fetch_by_auth_user(auth_user_id)
            .await?
            .ok_or(ServiceError::NotFound)?;

        if update.is_empty() {
            return Ok(talent);
        }
        if matches!(&update.last_name, Some(name) if name.trim().is_empty())
            || matches!(&update.first_name, Some(name) if name.trim().is_empty())
        {
            return Err(ServiceError::Invalid("氏名を入力してください".into()));
        }
        if matches!(update.desired_rate, Some(Some(rate)) if rate < 0) {
            return Err(ServiceError::Invalid(
                "希望単価は0以上で入力してください".into(),
            ));
        }

        let record = TALENT_MAP.encode(update)?;
        self.store
            .update_record(App::Talents, talent.id, record)
            .await?;
        update.apply(&mut talent);

        self.cache
            .set(CacheNamespace::Talents, &Self::cache_key(auth_user_id), &talent);
        info!(talent_id = talent.id, "talent profile updated");
        Ok(talent)
    }

    pub async fn withdraw(&self, talent: &Talent) -> ServiceResult<()> {
        let record = TALENT_MAP.encode(&StatusWrite {
            status: TalentStatus::Withdrawn,
        })?;
        self.store
            .update_record(App::Talents, talent.id, record)
            .await?;
        self.cache
            .invalidate(CacheNamespace::Talents, &Self::cache_key(talent.auth_user_id));
        info!(talent_id = talent.id, "talent withdrawn");
        Ok(())
    }
}
