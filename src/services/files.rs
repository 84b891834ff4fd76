use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::talents::{Talent, TalentService, TALENT_MAP};
use super::{ServiceError, ServiceResult};
use crate::cache::{CacheNamespace, RecordCache};
use crate::kintone::{App, RecordStore};

pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub file_key: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file: AttachedFile,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct FileRef<'a> {
    file_key: &'a str,
}

#[derive(Serialize)]
struct FilesWrite<'a> {
    resume_files: Vec<FileRef<'a>>,
}

/// Resume attachments on talent records.
pub struct FileService {
    store: Arc<dyn RecordStore>,
    cache: Arc<RecordCache>,
}

impl FileService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<RecordCache>) -> Self {
        Self { store, cache }
    }

    pub async fn upload(
        &self,
        talent: &Talent,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ServiceResult<Talent> {
        if file_name.trim().is_empty() {
            return Err(ServiceError::Invalid("ファイル名が必要です".into()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::Invalid("ファイルが空です".into()));
        }
        if bytes.len() > MAX_FILE_BYTES {
            return Err(ServiceError::Invalid(
                "ファイルサイズは10MB以下にしてください".into(),
            ));
        }

        let size = bytes.len();
        let temporary_key = self
            .store
            .upload_file(file_name, content_type, bytes)
            .await?;

        let mut refs: Vec<FileRef<'_>> = talent
            .resume_files
            .iter()
            .map(|file| FileRef {
                file_key: &file.file_key,
            })
            .collect();
        refs.push(FileRef {
            file_key: &temporary_key,
        });

        self.write_files(talent, refs).await?;
        info!(talent_id = talent.id, file_name, size, "resume file attached");
        self.reload(talent).await
    }

    pub async fn delete(&self, talent: &Talent, file_key: &str) -> ServiceResult<Talent> {
        if !talent.resume_files.iter().any(|file| file.file_key == file_key) {
            return Err(ServiceError::NotFound);
        }

        let refs = talent
            .resume_files
            .iter()
            .filter(|file| file.file_key != file_key)
            .map(|file| FileRef {
                file_key: &file.file_key,
            })
            .collect();

        self.write_files(talent, refs).await?;
        info!(talent_id = talent.id, file_key, "resume file removed");
        self.reload(talent).await
    }

    pub async fn download(&self, talent: &Talent, file_key: &str) -> ServiceResult<DownloadedFile> {
        let file = talent
            .resume_files
            .iter()
            .find(|file| file.file_key == file_key)
            .cloned()
            .ok_or(ServiceError::NotFound)?;

        let bytes = self.store.download_file(&file.file_key).await?;
        Ok(DownloadedFile { file, bytes })
    }

    async fn write_files(&self, talent: &Talent, resume_files: Vec<FileRef<'_>>) -> ServiceResult<()> {
        let record = TALENT_MAP.encode(&FilesWrite { resume_files })?;
        self.store
            .update_record(App::Talents, talent.id, record)
            .await?;
        Ok(())
    }

    /// kintone reissues file keys on every save, so the record is read back.
    async fn reload(&self, talent: &Talent) -> ServiceResult<Talent> {
        let key = TalentService::cache_key(talent.auth_user_id);
        self.cache.invalidate(CacheNamespace::Talents, &key);

        let record = self
            .store
            .get_record(App::Talents, talent.id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let refreshed: Talent = TALENT_MAP.decode(&record)?;
        self.cache.set(CacheNamespace::Talents, &key, &refreshed);
        Ok(refreshed)
    }
}
