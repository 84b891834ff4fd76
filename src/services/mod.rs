//! Domain operations over the record store.
//!
//! Each service owns a handle to the store and to the shared cache. Reads go
//! cache first, then upstream with the app's fixed field list, then through
//! the app's [`FieldMap`](crate::kintone::mapping::FieldMap).

use std::sync::Arc;

use thiserror::Error;

use crate::cache::RecordCache;
use crate::kintone::{mapping::MappingError, RecordStore, RecordStoreError};

pub mod aggregate;
pub mod applications;
pub mod files;
pub mod inquiries;
pub mod jobs;
pub mod locks;
pub mod talents;

pub use aggregate::{ApplicationWithJob, Aggregator, PrefetchBundle};
pub use applications::{Application, ApplicationService, ApplicationStatus};
pub use files::{AttachedFile, DownloadedFile, FileService};
pub use inquiries::{Inquiry, InquiryCategory, InquiryService, NewInquiry};
pub use jobs::{Job, JobPage, JobScope, JobSearch, JobService, JobSort};
pub use talents::{NewTalent, Talent, TalentService, TalentStatus, TalentUpdate};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("record not found")]
    NotFound,
    #[error("an application for this job already exists")]
    DuplicateApplication,
    #[error("a profile already exists for this user")]
    ProfileExists,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// All services, built once per process around one store and one cache.
pub struct Services {
    pub jobs: JobService,
    pub talents: TalentService,
    pub applications: ApplicationService,
    pub inquiries: InquiryService,
    pub files: FileService,
}

impl Services {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<RecordCache>) -> Self {
        Self {
            jobs: JobService::new(store.clone(), cache.clone()),
            talents: TalentService::new(store.clone(), cache.clone()),
            applications: ApplicationService::new(store.clone(), cache.clone()),
            inquiries: InquiryService::new(store.clone()),
            files: FileService::new(store, cache),
        }
    }

    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(self)
    }
}
