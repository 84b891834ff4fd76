use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};
use url::Url;

use super::{App, Record, RecordPage, RecordQuery, RecordStore, RecordStoreError, StoreResult};
use crate::config::{KintoneApp, KintoneConfig};

const API_TOKEN_HEADER: &str = "X-Cybozu-API-Token";
const RECORD_NOT_FOUND_CODE: &str = "GAIA_RE01";

/// REST client for one kintone domain.
pub struct KintoneClient {
    http: Client,
    config: KintoneConfig,
}

#[derive(Deserialize)]
struct RecordsResponse {
    records: Vec<Record>,
    #[serde(rename = "totalCount")]
    total_count: Option<String>,
}

#[derive(Deserialize)]
struct RecordResponse {
    record: Record,
}

#[derive(Deserialize)]
struct AddRecordResponse {
    id: String,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    #[serde(rename = "fileKey")]
    file_key: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl KintoneClient {
    pub fn new(config: KintoneConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn app(&self, app: App) -> &KintoneApp {
        match app {
            App::Jobs => &self.config.jobs,
            App::Talents => &self.config.talents,
            App::Applications => &self.config.applications,
            App::Inquiries => &self.config.inquiries,
        }
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        Ok(self.config.base_url.join(path)?)
    }

    fn request(&self, method: Method, path: &str, token: &str) -> StoreResult<RequestBuilder> {
        Ok(self
            .http
            .request(method, self.endpoint(path)?)
            .header(API_TOKEN_HEADER, token))
    }

    /// Attachments live on talent records, so file calls use that app's token.
    fn file_token(&self) -> &str {
        &self.config.talents.api_token
    }

    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let (code, message) = match parsed {
            Some(ErrorBody { code, message }) => (code, message.unwrap_or_else(|| body.clone())),
            None => (None, body),
        };
        error!(%status, code = ?code, %message, "kintone request failed");
        Err(RecordStoreError::Status {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl RecordStore for KintoneClient {
    async fn get_records(
        &self,
        app: App,
        query: &RecordQuery,
        fields: &[&str],
    ) -> StoreResult<RecordPage> {
        let target = self.app(app);
        let rendered = query.render();

        let mut params: Vec<(String, String)> = vec![
            ("app".into(), target.id.to_string()),
            ("query".into(), rendered.clone()),
        ];
        for (index, field) in fields.iter().enumerate() {
            params.push((format!("fields[{index}]"), field.to_string()));
        }
        if query.total_count {
            params.push(("totalCount".into(), "true".into()));
        }

        debug!(%app, query = %rendered, "fetching kintone records");
        let response = self
            .request(Method::GET, "/k/v1/records.json", &target.api_token)?
            .query(&params)
            .send()
            .await?;
        let body: RecordsResponse = Self::check(response).await?.json().await?;

        let total_count = match body.total_count {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                RecordStoreError::Decode(format!("totalCount is not a number: {raw}"))
            })?),
            None => None,
        };

        Ok(RecordPage {
            records: body.records,
            total_count,
        })
    }

    async fn get_record(&self, app: App, id: u64) -> StoreResult<Option<Record>> {
        let target = self.app(app);
        debug!(%app, id, "fetching kintone record");
        let response = self
            .request(Method::GET, "/k/v1/record.json", &target.api_token)?
            .query(&[("app", target.id.to_string()), ("id", id.to_string())])
            .send()
            .await?;

        match Self::check(response).await {
            Ok(response) => {
                let body: RecordResponse = response.json().await?;
                Ok(Some(body.record))
            }
            Err(RecordStoreError::Status { status: 404, .. }) => Ok(None),
            Err(RecordStoreError::Status { code: Some(code), .. })
                if code == RECORD_NOT_FOUND_CODE =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn add_record(&self, app: App, record: Record) -> StoreResult<u64> {
        let target = self.app(app);
        debug!(%app, "adding kintone record");
        let response = self
            .request(Method::POST, "/k/v1/record.json", &target.api_token)?
            .json(&json!({ "app": target.id, "record": record }))
            .send()
            .await?;
        let body: AddRecordResponse = Self::check(response).await?.json().await?;
        body.id
            .parse()
            .map_err(|_| RecordStoreError::Decode(format!("record id is not a number: {}", body.id)))
    }

    async fn update_record(&self, app: App, id: u64, record: Record) -> StoreResult<()> {
        let target = self.app(app);
        debug!(%app, id, "updating kintone record");
        let response = self
            .request(Method::PUT, "/k/v1/record.json", &target.api_token)?
            .json(&json!({ "app": target.id, "id": id, "record": record }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("file", part);

        debug!(file_name, content_type, "uploading file to kintone");
        let response = self
            .request(Method::POST, "/k/v1/file.json", self.file_token())?
            .multipart(form)
            .send()
            .await?;
        let body: FileUploadResponse = Self::check(response).await?.json().await?;
        Ok(body.file_key)
    }

    async fn download_file(&self, file_key: &str) -> StoreResult<Vec<u8>> {
        debug!(file_key, "downloading file from kintone");
        let response = self
            .request(Method::GET, "/k/v1/file.json", self.file_token())?
            .query(&[("fileKey", file_key)])
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
