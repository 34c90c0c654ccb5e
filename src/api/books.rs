use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};

use crate::auth::Claims;
use crate::models::Book;
use crate::services::book_service;

use super::domain_error;

#[utoipa::path(
    get,
    path = "/api/books",
    responses(
        (status = 200, description = "Full catalog listing")
    )
)]
pub async fn list_books(
    State(db): State<DatabaseConnection>,
    claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    let books = book_service::list_books(&db).await.map_err(domain_error)?;
    let total = books.len();
    Ok(Json(json!({ "books": books, "total": total })))
}

#[utoipa::path(
    get,
    path = "/api/books/available",
    responses(
        (status = 200, description = "Books that can be selected into a new loan request")
    )
)]
pub async fn list_available_books(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let books = book_service::list_available_books(&db)
        .await
        .map_err(domain_error)?;
    let total = books.len();
    Ok(Json(json!({ "books": books, "total": total })))
}

pub async fn get_book(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let book = book_service::get_book(&db, id).await.map_err(domain_error)?;
    Ok(Json(json!({ "book": book })))
}

#[utoipa::path(
    post,
    path = "/api/books",
    responses(
        (status = 201, description = "Book created"),
        (status = 400, description = "Missing title or invalid date")
    )
)]
pub async fn create_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<Book>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    let book = book_service::create_book(&db, payload)
        .await
        .map_err(domain_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Book created successfully", "book": book })),
    ))
}

pub async fn update_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<Book>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    let book = book_service::update_book(&db, id, payload)
        .await
        .map_err(domain_error)?;
    Ok(Json(json!({ "message": "Book updated successfully", "book": book })))
}

#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    responses(
        (status = 200, description = "Book deleted"),
        (status = 409, description = "Book is referenced by an open loan request")
    )
)]
pub async fn delete_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    book_service::delete_book(&db, id)
        .await
        .map_err(domain_error)?;
    Ok(Json(json!({ "message": "Book deleted successfully" })))
}
