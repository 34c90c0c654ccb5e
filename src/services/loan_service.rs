//! Loan Lifecycle Engine
//!
//! Owns the status path of a loan request (pending -> approved | rejected,
//! approved -> completed) and keeps `Book.available` consistent with it.
//! Books are locked on approval, never at request creation, and unlocked on
//! rejection or completion. Every transition that touches both the request
//! row and book rows runs in a single transaction.

use chrono::{Local, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::DomainError;
use crate::models::book::{self, Entity as Book};
use crate::models::loan_item::{self, Entity as LoanItem};
use crate::models::loan_request::{self, Entity as LoanRequest, LoanStatus};
use crate::models::member::{self, Entity as Member};

/// The user performing a lifecycle call
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i32,
    pub staff: bool,
}

/// Filter parameters for listing loan requests
#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub member_id: Option<i32>,
    pub status: Option<LoanStatus>,
}

/// Loan request enriched with the member's display name
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub id: i32,
    pub code: String,
    pub member_id: i32,
    pub member_name: String,
    pub reviewer_id: Option<i32>,
    pub requested_on: String,
    pub pickup_date: Option<String>,
    pub due_date: Option<String>,
    pub returned_on: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: i32,
    pub book_id: i32,
    pub title: String,
    pub available: bool,
}

/// Full view of a single request: header plus its line items
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetails {
    #[serde(flatten)]
    pub summary: RequestSummary,
    pub items: Vec<ItemDetail>,
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn new_code() -> String {
    format!(
        "P-{}",
        &Uuid::new_v4().simple().to_string()[..6].to_uppercase()
    )
}

/// Resolve the member profile of an account, e.g. to scope listings
pub async fn member_for_user(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<member::Model, DomainError> {
    Member::find()
        .filter(member::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)
}

async fn find_by_code(
    db: &impl sea_orm::ConnectionTrait,
    code: &str,
) -> Result<loan_request::Model, DomainError> {
    LoanRequest::find()
        .filter(loan_request::Column::Code.eq(code))
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)
}

fn require_status(
    request: &loan_request::Model,
    expected: LoanStatus,
    verb: &str,
) -> Result<(), DomainError> {
    if request.status != expected.as_str() {
        return Err(DomainError::InvalidTransition(format!(
            "cannot {} a {} request",
            verb, request.status
        )));
    }
    Ok(())
}

/// Create a loan request: header in status `pending` plus one line item per
/// book. Every selected book must exist and be available at selection time;
/// the books themselves stay unlocked until approval.
pub async fn create_request(
    db: &DatabaseConnection,
    member_id: i32,
    book_ids: &[i32],
) -> Result<loan_request::Model, DomainError> {
    if book_ids.is_empty() {
        return Err(DomainError::Validation(
            "at least one book must be selected".to_string(),
        ));
    }

    // A book selected twice counts once
    let mut book_ids = book_ids.to_vec();
    book_ids.sort_unstable();
    book_ids.dedup();

    Member::find_by_id(member_id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let now = now_rfc3339();
    let txn = db.begin().await?;

    let books = Book::find()
        .filter(book::Column::Id.is_in(book_ids.clone()))
        .all(&txn)
        .await?;

    if books.len() != book_ids.len() {
        return Err(DomainError::NotFound);
    }

    for b in &books {
        if !b.available {
            return Err(DomainError::Validation(format!(
                "\"{}\" is not available for loan",
                b.title
            )));
        }
    }

    let header = loan_request::ActiveModel {
        code: Set(new_code()),
        member_id: Set(member_id),
        reviewer_id: Set(None),
        requested_on: Set(today()),
        status: Set(LoanStatus::Pending.as_str().to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    let saved = header.insert(&txn).await?;

    for book_id in &book_ids {
        let item = loan_item::ActiveModel {
            request_id: Set(saved.id),
            book_id: Set(*book_id),
            created_at: Set(now.clone()),
            ..Default::default()
        };
        item.insert(&txn).await?;
    }

    txn.commit().await?;

    tracing::info!(
        "Loan request {} created for member {} ({} books)",
        saved.code,
        member_id,
        book_ids.len()
    );

    Ok(saved)
}

/// Approve a pending request: lock every referenced book and stamp the
/// reviewer, pickup date (today) and the caller-supplied due date.
///
/// Availability is re-checked inside the transaction with a conditional
/// batch update; if another request claimed one of the books in the
/// meantime the whole transition rolls back with `Conflict`.
pub async fn approve_request(
    db: &DatabaseConnection,
    code: &str,
    reviewer_id: i32,
    due_date: Option<&str>,
) -> Result<loan_request::Model, DomainError> {
    let due = match due_date {
        Some(d) if !d.trim().is_empty() => d.trim(),
        _ => {
            return Err(DomainError::Validation(
                "a due date is required to approve a request".to_string(),
            ))
        }
    };
    NaiveDate::parse_from_str(due, "%Y-%m-%d").map_err(|_| {
        DomainError::Validation(format!("invalid due date \"{}\", expected YYYY-MM-DD", due))
    })?;

    let request = find_by_code(db, code).await?;
    require_status(&request, LoanStatus::Pending, "approve")?;

    let txn = db.begin().await?;

    let book_ids: Vec<i32> = LoanItem::find()
        .filter(loan_item::Column::RequestId.eq(request.id))
        .all(&txn)
        .await?
        .iter()
        .map(|i| i.book_id)
        .collect();

    // Lock the books, but only those still unlocked. Fewer rows than
    // expected means another approval claimed one of them first.
    let locked = Book::update_many()
        .col_expr(book::Column::Available, Expr::value(false))
        .col_expr(book::Column::UpdatedAt, Expr::value(now_rfc3339()))
        .filter(book::Column::Id.is_in(book_ids.clone()))
        .filter(book::Column::Available.eq(true))
        .exec(&txn)
        .await?;

    if locked.rows_affected != book_ids.len() as u64 {
        return Err(DomainError::Conflict(
            "one or more selected books were already claimed by another request".to_string(),
        ));
    }

    // Conditional update guards against a concurrent transition on the
    // same request row.
    let updated = LoanRequest::update_many()
        .col_expr(
            loan_request::Column::Status,
            Expr::value(LoanStatus::Approved.as_str()),
        )
        .col_expr(loan_request::Column::ReviewerId, Expr::value(reviewer_id))
        .col_expr(loan_request::Column::PickupDate, Expr::value(today()))
        .col_expr(loan_request::Column::DueDate, Expr::value(due))
        .col_expr(loan_request::Column::UpdatedAt, Expr::value(now_rfc3339()))
        .filter(loan_request::Column::Id.eq(request.id))
        .filter(loan_request::Column::Status.eq(LoanStatus::Pending.as_str()))
        .exec(&txn)
        .await?;

    if updated.rows_affected != 1 {
        return Err(DomainError::InvalidTransition(
            "request was transitioned concurrently".to_string(),
        ));
    }

    txn.commit().await?;

    tracing::info!(
        "Loan request {} approved by user {}, due {}",
        code,
        reviewer_id,
        due
    );

    LoanRequest::find_by_id(request.id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)
}

/// Reject a pending request and release its books (a no-op for books that
/// were never locked).
pub async fn reject_request(
    db: &DatabaseConnection,
    code: &str,
    reviewer_id: i32,
) -> Result<loan_request::Model, DomainError> {
    let request = find_by_code(db, code).await?;
    require_status(&request, LoanStatus::Pending, "reject")?;

    let txn = db.begin().await?;

    unlock_books(&txn, request.id).await?;

    let updated = LoanRequest::update_many()
        .col_expr(
            loan_request::Column::Status,
            Expr::value(LoanStatus::Rejected.as_str()),
        )
        .col_expr(loan_request::Column::ReviewerId, Expr::value(reviewer_id))
        .col_expr(loan_request::Column::UpdatedAt, Expr::value(now_rfc3339()))
        .filter(loan_request::Column::Id.eq(request.id))
        .filter(loan_request::Column::Status.eq(LoanStatus::Pending.as_str()))
        .exec(&txn)
        .await?;

    if updated.rows_affected != 1 {
        return Err(DomainError::InvalidTransition(
            "request was transitioned concurrently".to_string(),
        ));
    }

    txn.commit().await?;

    tracing::info!("Loan request {} rejected by user {}", code, reviewer_id);

    LoanRequest::find_by_id(request.id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)
}

/// Complete an approved request, releasing its books.
///
/// Staff can complete any request; members can only mark their own request
/// as returned. Staff completion records the acting user as reviewer,
/// member self-service leaves the original reviewer in place.
pub async fn complete_request(
    db: &DatabaseConnection,
    code: &str,
    actor: Actor,
) -> Result<loan_request::Model, DomainError> {
    let request = find_by_code(db, code).await?;

    if !actor.staff {
        let profile = member_for_user(db, actor.user_id).await?;
        if request.member_id != profile.id {
            // members must not be able to probe other members' requests
            return Err(DomainError::NotFound);
        }
    }

    require_status(&request, LoanStatus::Approved, "complete")?;

    let txn = db.begin().await?;

    unlock_books(&txn, request.id).await?;

    let mut update = LoanRequest::update_many()
        .col_expr(
            loan_request::Column::Status,
            Expr::value(LoanStatus::Completed.as_str()),
        )
        .col_expr(loan_request::Column::ReturnedOn, Expr::value(today()))
        .col_expr(loan_request::Column::UpdatedAt, Expr::value(now_rfc3339()));

    if actor.staff {
        update = update.col_expr(loan_request::Column::ReviewerId, Expr::value(actor.user_id));
    }

    let updated = update
        .filter(loan_request::Column::Id.eq(request.id))
        .filter(loan_request::Column::Status.eq(LoanStatus::Approved.as_str()))
        .exec(&txn)
        .await?;

    if updated.rows_affected != 1 {
        return Err(DomainError::InvalidTransition(
            "request was transitioned concurrently".to_string(),
        ));
    }

    txn.commit().await?;

    tracing::info!("Loan request {} completed by user {}", code, actor.user_id);

    LoanRequest::find_by_id(request.id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)
}

/// Remove a single line item from a request. Only allowed while the parent
/// is still pending; the book's availability is never touched here since
/// locking only happens on approval.
pub async fn remove_item(db: &DatabaseConnection, item_id: i32) -> Result<(), DomainError> {
    let item = LoanItem::find_by_id(item_id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let parent = LoanRequest::find_by_id(item.request_id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    if parent.status != LoanStatus::Pending.as_str() {
        return Err(DomainError::InvalidTransition(format!(
            "items can only be removed while a request is pending, not {}",
            parent.status
        )));
    }

    // The check above only shapes the error message; the delete itself
    // re-verifies the parent status so an approval landing in between
    // cannot strip a line item whose book was just locked.
    let pending_parents = Query::select()
        .column(loan_request::Column::Id)
        .from(LoanRequest)
        .and_where(loan_request::Column::Status.eq(LoanStatus::Pending.as_str()))
        .to_owned();

    let deleted = LoanItem::delete_many()
        .filter(loan_item::Column::Id.eq(item_id))
        .filter(loan_item::Column::RequestId.in_subquery(pending_parents))
        .exec(db)
        .await?;

    if deleted.rows_affected != 1 {
        return Err(DomainError::InvalidTransition(
            "request was transitioned concurrently".to_string(),
        ));
    }

    Ok(())
}

/// List requests, newest first, optionally scoped to one member or status
pub async fn list_requests(
    db: &DatabaseConnection,
    filter: RequestFilter,
) -> Result<Vec<RequestSummary>, DomainError> {
    let mut query = LoanRequest::find();

    if let Some(member_id) = filter.member_id {
        query = query.filter(loan_request::Column::MemberId.eq(member_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(loan_request::Column::Status.eq(status.as_str()));
    }

    let requests_with_members = query
        .order_by_desc(loan_request::Column::RequestedOn)
        .order_by_desc(loan_request::Column::Id)
        .find_also_related(Member)
        .all(db)
        .await?;

    let result = requests_with_members
        .into_iter()
        .map(|(request, profile)| summarize(request, profile))
        .collect();

    Ok(result)
}

/// Fetch one request with its line items and book titles
pub async fn get_request(
    db: &DatabaseConnection,
    code: &str,
) -> Result<RequestDetails, DomainError> {
    let request = find_by_code(db, code).await?;

    let profile = Member::find_by_id(request.member_id).one(db).await?;

    let items = LoanItem::find()
        .filter(loan_item::Column::RequestId.eq(request.id))
        .all(db)
        .await?;

    let book_ids: Vec<i32> = items.iter().map(|i| i.book_id).collect();
    let mut book_map: HashMap<i32, book::Model> = HashMap::new();
    if !book_ids.is_empty() {
        for b in Book::find()
            .filter(book::Column::Id.is_in(book_ids))
            .all(db)
            .await?
        {
            book_map.insert(b.id, b);
        }
    }

    let items = items
        .into_iter()
        .map(|item| {
            let book = book_map.get(&item.book_id);
            ItemDetail {
                id: item.id,
                book_id: item.book_id,
                title: book
                    .map(|b| b.title.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                available: book.map(|b| b.available).unwrap_or(false),
            }
        })
        .collect();

    Ok(RequestDetails {
        summary: summarize(request, profile),
        items,
    })
}

fn summarize(request: loan_request::Model, profile: Option<member::Model>) -> RequestSummary {
    let member_name = profile
        .map(|p| p.display_name)
        .unwrap_or_else(|| "Unknown".to_string());

    RequestSummary {
        id: request.id,
        code: request.code,
        member_id: request.member_id,
        member_name,
        reviewer_id: request.reviewer_id,
        requested_on: request.requested_on,
        pickup_date: request.pickup_date,
        due_date: request.due_date,
        returned_on: request.returned_on,
        status: request.status,
    }
}

async fn unlock_books(
    txn: &sea_orm::DatabaseTransaction,
    request_id: i32,
) -> Result<(), DomainError> {
    let book_ids: Vec<i32> = LoanItem::find()
        .filter(loan_item::Column::RequestId.eq(request_id))
        .all(txn)
        .await?
        .iter()
        .map(|i| i.book_id)
        .collect();

    if book_ids.is_empty() {
        return Ok(());
    }

    Book::update_many()
        .col_expr(book::Column::Available, Expr::value(true))
        .col_expr(book::Column::UpdatedAt, Expr::value(now_rfc3339()))
        .filter(book::Column::Id.is_in(book_ids))
        .exec(txn)
        .await?;

    Ok(())
}
