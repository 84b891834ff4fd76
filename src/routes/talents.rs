use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::Response,
    Json,
};
use bytes::Bytes;
use mime_guess::mime::Mime;
use serde_json::Value;
use tracing::error;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    services::{NewTalent, Talent, TalentUpdate},
    state::AppState,
    utils::json::{classify_nullable, classify_nullable_integer, NullableValue},
};

pub async fn create_talent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<NewTalent>,
) -> AppResult<(StatusCode, Json<Talent>)> {
    let talent = state
        .services
        .talents
        .create(user.user_id, &user.email, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(talent)))
}

pub async fn get_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Talent>> {
    let talent = state
        .services
        .talents
        .get_by_auth_user(user.user_id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(talent))
}

/// Partial update: omitted keys are kept, `null` clears optional fields.
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<Talent>> {
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }
    let update = parse_update(&body)?;
    let talent = state
        .services
        .talents
        .update(user.user_id, &update)
        .await?;
    Ok(Json(talent))
}

fn parse_update(body: &Value) -> AppResult<TalentUpdate> {
    let text = |key: &str| {
        classify_nullable(body.get(key))
            .map_err(|err| AppError::bad_request(format!("{key}: {err}")))
    };
    let required = |key: &str| -> AppResult<Option<String>> {
        match text(key)? {
            NullableValue::Omitted => Ok(None),
            NullableValue::Null => Err(AppError::bad_request(format!("{key} cannot be cleared"))),
            NullableValue::Value(value) => Ok(Some(value)),
        }
    };

    Ok(TalentUpdate {
        last_name: required("last_name")?,
        first_name: required("first_name")?,
        last_name_kana: text("last_name_kana")?.into_patch(),
        first_name_kana: text("first_name_kana")?.into_patch(),
        phone: text("phone")?.into_patch(),
        skills: text("skills")?.into_patch(),
        experience: text("experience")?.into_patch(),
        desired_rate: classify_nullable_integer(body.get("desired_rate"))
            .map_err(|err| AppError::bad_request(format!("desired_rate: {err}")))?
            .into_patch(),
    })
}

pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Talent>)> {
    let mut upload: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("filename is required"))?;
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        upload = Some((file_name, content_type, data));
    }

    let (file_name, content_type, data) =
        upload.ok_or_else(|| AppError::bad_request("file field is required"))?;
    let content_type = upload_content_type(&file_name, content_type.as_deref());

    let talent = current_talent(&state, &user).await?;
    let talent = state
        .services
        .files
        .upload(&talent, &file_name, &content_type, data.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(talent)))
}

pub async fn download_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(file_key): Path<String>,
) -> AppResult<Response> {
    let talent = current_talent(&state, &user).await?;
    let downloaded = state.services.files.download(&talent, &file_key).await?;

    let content_type = HeaderValue::from_str(&downloaded.file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&attachment_disposition(&downloaded.file.name))
        .map_err(AppError::internal)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_DISPOSITION, disposition)
        .header(CONTENT_LENGTH, downloaded.bytes.len())
        .body(Body::from(Bytes::from(downloaded.bytes)))
        .map_err(AppError::internal)
}

pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(file_key): Path<String>,
) -> AppResult<Json<Talent>> {
    let talent = current_talent(&state, &user).await?;
    let talent = state.services.files.delete(&talent, &file_key).await?;
    Ok(Json(talent))
}

/// Attachment edits need the live file keys, so this skips the cache.
async fn current_talent(state: &AppState, user: &AuthenticatedUser) -> AppResult<Talent> {
    state
        .services
        .talents
        .fetch_by_auth_user(user.user_id)
        .await?
        .ok_or_else(AppError::not_found)
}

/// The declared part type when it parses as a MIME type, otherwise a guess from the file name.
fn upload_content_type(file_name: &str, declared: Option<&str>) -> String {
    match declared.and_then(|value| value.parse::<Mime>().ok()) {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string(),
    }
}

fn attachment_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii() && !ch.is_ascii_control() => ch,
            _ => '_',
        })
        .collect();
    let encoded =
        percent_encoding::utf8_percent_encode(file_name, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
