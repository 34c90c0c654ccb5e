use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Claims;
use crate::models::LoanStatus;
use crate::services::loan_service::{self, Actor, RequestFilter};

use super::domain_error;

#[derive(Deserialize)]
pub struct CreateLoanRequest {
    pub book_ids: Vec<i32>,
}

pub async fn create_request(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let profile = loan_service::member_for_user(&db, claims.uid)
        .await
        .map_err(domain_error)?;

    let request = loan_service::create_request(&db, profile.id, &payload.book_ids)
        .await
        .map_err(domain_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Loan request created, awaiting review",
            "request": request,
        })),
    ))
}

#[derive(Deserialize)]
pub struct ListLoansQuery {
    pub status: Option<String>,
}

pub async fn list_requests(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let status = match query.status.as_deref() {
        Some(s) => Some(LoanStatus::parse(s).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown status \"{}\"", s) })),
            )
        })?),
        None => None,
    };

    // staff see the full queue, members only their own history
    let member_id = if claims.staff {
        None
    } else {
        let profile = loan_service::member_for_user(&db, claims.uid)
            .await
            .map_err(domain_error)?;
        Some(profile.id)
    };

    let requests = loan_service::list_requests(&db, RequestFilter { member_id, status })
        .await
        .map_err(domain_error)?;

    let total = requests.len();
    Ok(Json(json!({ "requests": requests, "total": total })))
}

pub async fn get_request(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(code): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let details = loan_service::get_request(&db, &code)
        .await
        .map_err(domain_error)?;

    if !claims.staff {
        let profile = loan_service::member_for_user(&db, claims.uid)
            .await
            .map_err(domain_error)?;
        if details.summary.member_id != profile.id {
            return Err(domain_error(crate::domain::DomainError::NotFound));
        }
    }

    Ok(Json(json!({ "request": details })))
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub due_date: Option<String>,
}

pub async fn approve_request(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(code): Path<String>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    let request =
        loan_service::approve_request(&db, &code, claims.uid, payload.due_date.as_deref())
            .await
            .map_err(domain_error)?;

    Ok(Json(json!({ "message": "Loan request approved", "request": request })))
}

pub async fn reject_request(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(code): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    let request = loan_service::reject_request(&db, &code, claims.uid)
        .await
        .map_err(domain_error)?;

    Ok(Json(json!({ "message": "Loan request rejected", "request": request })))
}

pub async fn complete_request(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(code): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let actor = Actor {
        user_id: claims.uid,
        staff: claims.staff,
    };

    let request = loan_service::complete_request(&db, &code, actor)
        .await
        .map_err(domain_error)?;

    Ok(Json(json!({ "message": "Loan request completed, books released", "request": request })))
}

pub async fn remove_item(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    claims.require_staff()?;

    loan_service::remove_item(&db, id)
        .await
        .map_err(domain_error)?;

    Ok(Json(json!({ "message": "Item removed from the request" })))
}
