use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDateTime, Utc};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use talent_match::config::{AppConfig, Environment, KintoneApp, KintoneConfig};
use talent_match::credentials::CredentialStore;
use talent_match::kintone::{
    App, Condition, Record, RecordPage, RecordQuery, RecordStore, RecordStoreError, SortOrder,
    StoreResult, RECORD_ID_FIELD,
};
use talent_match::mailer::{Mailer, OutgoingMail};
use talent_match::models::{NewPasswordResetToken, NewUser, User};
use talent_match::routes;
use talent_match::state::AppState;
use tower::util::ServiceExt;
use url::Url;
use uuid::Uuid;

#[allow(dead_code)]
pub const ADMIN_USERNAME: &str = "console";
#[allow(dead_code)]
pub const ADMIN_PASSWORD: &str = "console-password";

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct StoreInner {
    apps: HashMap<App, Vec<Record>>,
    next_id: HashMap<App, u64>,
    files: HashMap<String, StoredFile>,
    next_file: u64,
}

/// Record store held in memory. Evaluates queries the way kintone would for
/// the operators the services use, and counts every call.
#[derive(Default)]
pub struct FakeRecordStore {
    inner: Mutex<StoreInner>,
    calls: Mutex<Vec<(&'static str, Option<App>)>>,
}

#[allow(dead_code)]
impl FakeRecordStore {
    fn record_call(&self, operation: &'static str, app: Option<App>) {
        self.calls.lock().unwrap().push((operation, app));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_count_for(&self, app: App) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, called)| *called == Some(app))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Inserts a record given as `{code: value}` and returns its id.
    pub fn insert(&self, app: App, fields: Value) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = next_id(&mut inner, app);
        let mut record = Record::new();
        if let Value::Object(fields) = fields {
            for (code, value) in fields {
                record.insert(code, json!({ "value": value }));
            }
        }
        record.insert(RECORD_ID_FIELD.to_string(), json!({ "value": id.to_string() }));
        inner.apps.entry(app).or_default().push(record);
        id
    }

    pub fn seed_job(&self, title: &str, location: &str, rate_max: i64, published: bool) -> u64 {
        let day = self.records(App::Jobs).len() + 1;
        self.insert(
            App::Jobs,
            json!({
                "案件名": title,
                "職種": ["エンジニア"],
                "スキル": ["Rust"],
                "特徴": [],
                "勤務地": location,
                "単価下限": (rate_max / 2).to_string(),
                "単価上限": rate_max.to_string(),
                "案件詳細": format!("{title} の詳細"),
                "AIマッチング": if published { vec!["対象"] } else { Vec::new() },
                "公開ステータス": if published { "公開" } else { "非公開" },
                "作成日時": format!("2024-05-{day:02}T09:00:00Z"),
            }),
        )
    }

    pub fn set_field(&self, app: App, id: u64, code: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .apps
            .get_mut(&app)
            .and_then(|records| records.iter_mut().find(|record| id_of(record) == id))
            .expect("record to update");
        record.insert(code.to_string(), json!({ "value": value }));
    }

    pub fn records(&self, app: App) -> Vec<Record> {
        self.inner
            .lock()
            .unwrap()
            .apps
            .get(&app)
            .cloned()
            .unwrap_or_default()
    }

    pub fn field(&self, app: App, id: u64, code: &str) -> Value {
        self.records(app)
            .iter()
            .find(|record| id_of(record) == id)
            .map(|record| field_value(record, code))
            .unwrap_or(Value::Null)
    }
}

fn next_id(inner: &mut StoreInner, app: App) -> u64 {
    let counter = inner.next_id.entry(app).or_insert(0);
    *counter += 1;
    *counter
}

fn id_of(record: &Record) -> u64 {
    talent_match::kintone::record_id(record).unwrap_or(0)
}

fn field_value(record: &Record, code: &str) -> Value {
    record
        .get(code)
        .and_then(|entry| entry.get("value"))
        .cloned()
        .unwrap_or(Value::Null)
}

fn as_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn matches(condition: &Condition, record: &Record) -> bool {
    match condition {
        Condition::Eq(field, expected) => {
            let values = as_strings(&field_value(record, field));
            if expected.is_empty() {
                values.is_empty()
            } else {
                values.iter().any(|value| value == expected)
            }
        }
        Condition::NotEq(field, expected) => {
            !matches(&Condition::Eq(field.clone(), expected.clone()), record)
        }
        Condition::In(field, expected) => as_strings(&field_value(record, field))
            .iter()
            .any(|value| expected.contains(value)),
        Condition::NotIn(field, expected) => {
            !matches(&Condition::In(field.clone(), expected.clone()), record)
        }
        Condition::Like(field, needle) => as_strings(&field_value(record, field))
            .iter()
            .any(|value| value.contains(needle.as_str())),
        Condition::And(items) => items.iter().all(|item| matches(item, record)),
        Condition::Or(items) => items.iter().any(|item| matches(item, record)),
    }
}

fn compare(a: &Record, b: &Record, order_by: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in order_by {
        let left = as_strings(&field_value(a, field)).join(",");
        let right = as_strings(&field_value(b, field)).join(",");
        let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
            (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => left.cmp(&right),
        };
        let ordering = match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// kintone reissues attachment keys whenever a record is saved.
fn reissue_file_keys(inner: &mut StoreInner, value: Value) -> Value {
    let Value::Array(items) = &value else {
        return value;
    };
    if items.is_empty() || !items.iter().all(|item| item.get("fileKey").is_some()) {
        return value;
    }

    let mut reissued = Vec::new();
    for item in items {
        let key = item.get("fileKey").and_then(Value::as_str).unwrap_or_default();
        let Some(file) = inner.files.get(key).cloned() else {
            continue;
        };
        inner.next_file += 1;
        let new_key = format!("file-{}", inner.next_file);
        reissued.push(json!({
            "fileKey": new_key,
            "name": file.name,
            "contentType": file.content_type,
            "size": file.bytes.len().to_string(),
        }));
        inner.files.insert(new_key, file);
    }
    Value::Array(reissued)
}

fn not_found() -> RecordStoreError {
    RecordStoreError::Status {
        status: 404,
        code: Some("GAIA_RE01".to_string()),
        message: "record not found".to_string(),
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn get_records(
        &self,
        app: App,
        query: &RecordQuery,
        _fields: &[&str],
    ) -> StoreResult<RecordPage> {
        self.record_call("get_records", Some(app));
        if query.offset.unwrap_or(0) > 10_000 {
            return Err(RecordStoreError::Status {
                status: 400,
                code: Some("CB_VA01".into()),
                message: "offset must be 10000 or less".into(),
            });
        }
        let mut matching: Vec<Record> = self
            .records(app)
            .into_iter()
            .filter(|record| query.conditions.iter().all(|c| matches(c, record)))
            .collect();
        matching.sort_by(|a, b| compare(a, b, &query.order_by));

        let total = matching.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.unwrap_or(100) as usize;
        let records = matching.into_iter().skip(offset).take(limit).collect();

        Ok(RecordPage {
            records,
            total_count: query.total_count.then_some(total),
        })
    }

    async fn get_record(&self, app: App, id: u64) -> StoreResult<Option<Record>> {
        self.record_call("get_record", Some(app));
        Ok(self
            .records(app)
            .into_iter()
            .find(|record| id_of(record) == id))
    }

    async fn add_record(&self, app: App, record: Record) -> StoreResult<u64> {
        self.record_call("add_record", Some(app));
        let mut inner = self.inner.lock().unwrap();
        let id = next_id(&mut inner, app);
        let mut stored = Record::new();
        for (code, entry) in record {
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            let value = reissue_file_keys(&mut inner, value);
            stored.insert(code, json!({ "value": value }));
        }
        stored.insert(RECORD_ID_FIELD.to_string(), json!({ "value": id.to_string() }));
        inner.apps.entry(app).or_default().push(stored);
        Ok(id)
    }

    async fn update_record(&self, app: App, id: u64, record: Record) -> StoreResult<()> {
        self.record_call("update_record", Some(app));
        let mut inner = self.inner.lock().unwrap();
        let mut updates = Vec::new();
        for (code, entry) in record {
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            updates.push((code, reissue_file_keys(&mut inner, value)));
        }
        let stored = inner
            .apps
            .get_mut(&app)
            .and_then(|records| records.iter_mut().find(|record| id_of(record) == id))
            .ok_or_else(not_found)?;
        for (code, value) in updates {
            stored.insert(code, json!({ "value": value }));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<String> {
        self.record_call("upload_file", None);
        let mut inner = self.inner.lock().unwrap();
        inner.next_file += 1;
        let key = format!("tmp-{}", inner.next_file);
        inner.files.insert(
            key.clone(),
            StoredFile {
                name: file_name.to_string(),
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(key)
    }

    async fn download_file(&self, file_key: &str) -> StoreResult<Vec<u8>> {
        self.record_call("download_file", None);
        self.inner
            .lock()
            .unwrap()
            .files
            .get(file_key)
            .map(|file| file.bytes.clone())
            .ok_or_else(not_found)
    }
}

#[derive(Default)]
struct CredentialsInner {
    users: Vec<User>,
    tokens: Vec<(NewPasswordResetToken, Option<NaiveDateTime>)>,
}

#[derive(Default)]
pub struct InMemoryCredentials {
    inner: Mutex<CredentialsInner>,
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<Option<User>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|existing| existing.email == user.email) {
            return Ok(None);
        }
        let now = Utc::now().naive_utc();
        let created = User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(created.clone());
        Ok(Some(created))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or_else(|| anyhow!("user {user_id} not found"))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn store_reset_token(&self, token: NewPasswordResetToken) -> Result<()> {
        self.inner.lock().unwrap().tokens.push((token, None));
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Uuid>> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.tokens.iter_mut().find(|(token, used_at)| {
            token.token_hash == token_hash && used_at.is_none() && token.expires_at > now
        });
        Ok(entry.map(|(token, used_at)| {
            *used_at = Some(now);
            token.user_id
        }))
    }
}

#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl CapturingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes every later `send` fail as an unreachable mail server would.
    pub fn fail_deliveries(&self) {
        self.failing.store(true, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            bail!("mail server unavailable");
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let app = |id: u64| KintoneApp {
        id,
        api_token: format!("token-{id}"),
    };
    AppConfig {
        environment: Environment::Test,
        database_url: "postgres://unused@localhost/unused".to_string(),
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        session_expiry_minutes: 60,
        session_cookie_secure: false,
        session_cookie_domain: None,
        cors_allowed_origin: None,
        admin_username: ADMIN_USERNAME.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        cache_ttl_seconds: 300,
        password_reset_url: "https://talent.example.com/password-reset".to_string(),
        password_reset_expiry_minutes: 30,
        kintone: KintoneConfig {
            base_url: Url::parse("https://example.cybozu.com/").expect("valid url"),
            jobs: app(1),
            talents: app(2),
            applications: app(3),
            inquiries: app(4),
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<FakeRecordStore>,
    pub mailer: Arc<CapturingMailer>,
    router: Router,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(FakeRecordStore::default());
        let mailer = Arc::new(CapturingMailer::default());
        let state = AppState::new(
            config,
            store.clone(),
            Arc::new(InMemoryCredentials::default()),
            mailer.clone(),
        )?;
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            store,
            mailer,
            router,
        })
    }

    /// Signs up, signs in and returns the `session=...` cookie pair.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<String> {
        let response = self
            .post_json(
                "/api/auth/sign-up",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "sign-up failed with status {}",
            response.status()
        );

        let response = self
            .post_json(
                "/api/auth/sign-in",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "sign-in failed with status {}",
            response.status()
        );
        session_cookie(&response).ok_or_else(|| anyhow!("sign-in did not set a session"))
    }

    /// Signs up and registers a talent profile. Returns the cookie and the talent record id.
    pub async fn register_talent(&self, email: &str) -> Result<(String, u64)> {
        let cookie = self.sign_up(email, "correct-horse").await?;
        let response = self
            .post_json(
                "/api/talents",
                &json!({
                    "last_name": "山田",
                    "first_name": "太郎",
                    "last_name_kana": "ヤマダ",
                    "first_name_kana": "タロウ",
                    "phone": "090-1234-5678",
                    "skills": "Rust, PostgreSQL",
                    "experience": "Web系開発 5年",
                    "desired_rate": 650000
                }),
                Some(&cookie),
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "talent registration failed with status {}",
            response.status()
        );
        let talent: Value = read_json(response).await?;
        let id = talent["id"]
            .as_u64()
            .ok_or_else(|| anyhow!("talent id missing"))?;
        Ok((cookie, id))
    }

    pub async fn admin_login(&self) -> Result<String> {
        let response = self
            .post_json(
                "/api/admin/login",
                &json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }),
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "admin login failed with status {}",
            response.status()
        );
        session_cookie(&response).ok_or_else(|| anyhow!("admin login did not set a session"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, cookie).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, cookie).await
    }

    pub async fn post(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::POST, path, cookie).await
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::GET, path, cookie).await
    }

    pub async fn delete(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::DELETE, path, cookie).await
    }

    pub async fn upload_file(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        cookie: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(COOKIE, cookie)
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body))?).await
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

/// The `name=value` pair of the session cookie set by a response, if any.
pub fn session_cookie(response: &hyper::Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with("session=") && pair.len() > "session=".len())
        .map(str::to_string)
}

#[allow(dead_code)]
pub fn set_cookie_header(response: &hyper::Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}
