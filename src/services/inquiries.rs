use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::talents::{Talent, TalentService};
use super::{ServiceError, ServiceResult};
use crate::kintone::mapping::{field, Coercion, FieldMap, FieldSpec};
use crate::kintone::{App, RecordStore, RECORD_ID_FIELD};

pub const MAX_CONTENT_CHARS: usize = 2000;

pub mod fields {
    pub const AUTH_USER_ID: &str = "auth_user_id";
    pub const NAME: &str = "氏名";
    pub const EMAIL: &str = "メールアドレス";
    pub const CATEGORY: &str = "種別";
    pub const CONTENT: &str = "内容";
    pub const PROGRESS: &str = "対応状況";
    pub const CREATED_AT: &str = "作成日時";

    pub const COMPLETED_MARKER: &str = "完了";
}

const INQUIRY_FIELDS: &[FieldSpec] = &[
    field(RECORD_ID_FIELD, "id", Coercion::Id),
    field(fields::AUTH_USER_ID, "auth_user_id", Coercion::Text),
    field(fields::NAME, "name", Coercion::Text),
    field(fields::EMAIL, "email", Coercion::Text),
    field(fields::CATEGORY, "category", Coercion::Text),
    field(fields::CONTENT, "content", Coercion::Text),
    field(
        fields::PROGRESS,
        "completed",
        Coercion::Flag(fields::COMPLETED_MARKER),
    ),
    field(fields::CREATED_AT, "created_at", Coercion::Timestamp),
];

pub const INQUIRY_MAP: FieldMap = FieldMap::new(INQUIRY_FIELDS);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InquiryCategory {
    #[default]
    #[serde(rename = "一般", alias = "general")]
    General,
    #[serde(rename = "退会", alias = "withdrawal")]
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: u64,
    pub auth_user_id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub category: InquiryCategory,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewInquiry {
    #[serde(default)]
    pub category: InquiryCategory,
    pub content: String,
}

impl NewInquiry {
    pub fn validate(&self) -> ServiceResult<()> {
        let length = self.content.trim().chars().count();
        if length == 0 {
            return Err(ServiceError::Invalid("お問い合わせ内容を入力してください".into()));
        }
        if length > MAX_CONTENT_CHARS {
            return Err(ServiceError::Invalid(format!(
                "お問い合わせ内容は{MAX_CONTENT_CHARS}文字以内で入力してください"
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct InquiryWrite<'a> {
    auth_user_id: Uuid,
    name: &'a str,
    email: Option<&'a str>,
    category: InquiryCategory,
    content: &'a str,
    completed: bool,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CompletionWrite {
    completed: bool,
}

pub struct InquiryService {
    store: Arc<dyn RecordStore>,
}

impl InquiryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Files an inquiry on behalf of a talent; contact details come from the profile.
    pub async fn create(&self, talent: &Talent, inquiry: NewInquiry) -> ServiceResult<Inquiry> {
        inquiry.validate()?;

        let name = talent.full_name();
        let content = inquiry.content.trim();
        let created_at = Utc::now().trunc_subsecs(0);
        let record = INQUIRY_MAP.encode(&InquiryWrite {
            auth_user_id: talent.auth_user_id,
            name: &name,
            email: talent.email.as_deref(),
            category: inquiry.category,
            content,
            completed: false,
            created_at,
        })?;
        let id = self.store.add_record(App::Inquiries, record).await?;
        info!(inquiry_id = id, talent_id = talent.id, category = ?inquiry.category, "inquiry filed");

        Ok(Inquiry {
            id,
            auth_user_id: Some(talent.auth_user_id),
            name,
            email: talent.email.clone(),
            category: inquiry.category,
            content: content.to_string(),
            completed: false,
            created_at: Some(created_at),
        })
    }

    /// Closes the caller's withdrawal inquiry and marks their profile withdrawn.
    pub async fn complete_withdrawal(
        &self,
        talent: &Talent,
        inquiry_id: u64,
        talents: &TalentService,
    ) -> ServiceResult<Inquiry> {
        let record = self
            .store
            .get_record(App::Inquiries, inquiry_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let mut inquiry: Inquiry = INQUIRY_MAP.decode(&record)?;

        if inquiry.auth_user_id != Some(talent.auth_user_id) {
            return Err(ServiceError::NotFound);
        }
        if inquiry.category != InquiryCategory::Withdrawal {
            return Err(ServiceError::Invalid("退会のお問い合わせではありません".into()));
        }

        if !inquiry.completed {
            let record = INQUIRY_MAP.encode(&CompletionWrite { completed: true })?;
            self.store
                .update_record(App::Inquiries, inquiry_id, record)
                .await?;
            inquiry.completed = true;
        }
        talents.withdraw(talent).await?;

        info!(inquiry_id, talent_id = talent.id, "withdrawal completed");
        Ok(inquiry)
    }
}
