use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{create_jwt, verify_password};
use crate::models::user;
use crate::services::member_service::{self, Registration};

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

pub async fn login(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    tracing::info!("Login attempt for user: {}", payload.username);

    let user = match user::Entity::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&db)
        .await
    {
        Ok(Some(u)) => u,
        _ => {
            tracing::warn!("User not found: {}", payload.username);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => match create_jwt(&user) {
            Ok(token) => (
                StatusCode::OK,
                Json(json!({ "token": token, "staff": user.is_staff })),
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Failed to issue token for {}: {}", user.username, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to issue token" })),
                )
                    .into_response()
            }
        },
        _ => {
            tracing::warn!("Password verification failed for user: {}", user.username);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    display_name: String,
}

pub async fn register(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let result = member_service::register(
        &db,
        Registration {
            username: payload.username,
            password: payload.password,
            display_name: payload.display_name,
        },
    )
    .await;

    match result {
        Ok((account, profile)) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Registration successful",
                "user": { "id": account.id, "username": account.username },
                "profile": profile,
            })),
        )
            .into_response(),
        Err(e) => super::domain_error(e).into_response(),
    }
}
