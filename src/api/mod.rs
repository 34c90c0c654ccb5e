pub mod auth;
pub mod books;
pub mod health;
pub mod loans;
pub mod profile;

use axum::{
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::db::AppState;
use crate::domain::DomainError;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/available", get(books::list_available_books))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Loan requests
        .route("/loans", get(loans::list_requests).post(loans::create_request))
        .route("/loans/:code", get(loans::get_request))
        .route("/loans/:code/approve", post(loans::approve_request))
        .route("/loans/:code/reject", post(loans::reject_request))
        .route("/loans/:code/complete", post(loans::complete_request))
        .route("/loans/items/:id", delete(loans::remove_item))
        // Profile
        .route("/profile", get(profile::get_profile))
        .route("/profile/photo", put(profile::upload_photo))
        .with_state(state)
}

/// Map a domain error onto an HTTP response.
///
/// `invalid_transition` and `conflict` both map to 409 but stay
/// distinguishable through the `code` field.
pub(crate) fn domain_error(e: DomainError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::InvalidTransition(_) => StatusCode::CONFLICT,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Database(_) | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Request failed: {}", e);
    }

    (
        status,
        Json(json!({ "error": e.to_string(), "code": e.code() })),
    )
}
