use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::fs;
use std::path::Path as FsPath;

use crate::auth::Claims;
use crate::db::AppState;
use crate::services::{loan_service, member_service};

use super::domain_error;

pub async fn get_profile(
    State(db): State<DatabaseConnection>,
    claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let profile = loan_service::member_for_user(&db, claims.uid)
        .await
        .map_err(domain_error)?;

    Ok(Json(json!({
        "username": claims.sub,
        "staff": claims.staff,
        "profile": profile,
    })))
}

/// Store an uploaded profile photo under the media dir and record its path
pub async fn upload_photo(
    State(state): State<AppState>,
    claims: Claims,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("Malformed multipart body: {}", e) })),
                ));
            }
        };

        if field.name() != Some("photo") {
            continue;
        }

        let ext = field
            .file_name()
            .and_then(|n| FsPath::new(n).extension().and_then(|e| e.to_str()))
            .unwrap_or("jpg")
            .to_ascii_lowercase();

        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

        let photo_dir = format!("{}/photos", state.media_dir);
        if let Err(e) = fs::create_dir_all(&photo_dir) {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to create media dir: {}", e) })),
            ));
        }

        let relative = format!("photos/{}.{}", uuid::Uuid::new_v4(), ext);
        let path = format!("{}/{}", state.media_dir, relative);
        if let Err(e) = fs::write(&path, &data) {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to save photo: {}", e) })),
            ));
        }

        let profile = member_service::set_photo(&state.conn, claims.uid, relative)
            .await
            .map_err(domain_error)?;

        return Ok(Json(json!({
            "message": "Photo uploaded",
            "profile": profile,
        })));
    }

    Err((
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Missing \"photo\" field in upload" })),
    ))
}
