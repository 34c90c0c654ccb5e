//! Book Catalog - plain CRUD over book records
//!
//! The `available` flag is owned by the loan lifecycle and is never set from
//! catalog payloads. Deleting a book that is still referenced by a pending
//! or approved request is refused; historical references (rejected or
//! completed requests) do not block deletion and are removed with the book.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};

use crate::domain::DomainError;
use crate::models::book::{self, Book, Entity as BookEntity};
use crate::models::loan_item::{self, Entity as LoanItem};
use crate::models::loan_request::{self, LoanStatus};

fn validate(dto: &Book) -> Result<(), DomainError> {
    if dto.title.trim().is_empty() {
        return Err(DomainError::Validation("title is required".to_string()));
    }
    if let Some(date) = dto.published_on.as_deref() {
        if !date.is_empty() && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(DomainError::Validation(format!(
                "invalid publication date \"{}\", expected YYYY-MM-DD",
                date
            )));
        }
    }
    Ok(())
}

/// List the whole catalog
pub async fn list_books(db: &DatabaseConnection) -> Result<Vec<Book>, DomainError> {
    let books = BookEntity::find()
        .order_by_asc(book::Column::Title)
        .all(db)
        .await?;
    Ok(books.into_iter().map(Book::from).collect())
}

/// List only books that can currently be selected into a new loan request
pub async fn list_available_books(db: &DatabaseConnection) -> Result<Vec<Book>, DomainError> {
    let books = BookEntity::find()
        .filter(book::Column::Available.eq(true))
        .order_by_asc(book::Column::Title)
        .all(db)
        .await?;
    Ok(books.into_iter().map(Book::from).collect())
}

pub async fn get_book(db: &DatabaseConnection, id: i32) -> Result<Book, DomainError> {
    let book = BookEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;
    Ok(Book::from(book))
}

pub async fn create_book(db: &DatabaseConnection, dto: Book) -> Result<Book, DomainError> {
    validate(&dto)?;

    let now = Utc::now().to_rfc3339();
    let model = book::ActiveModel {
        title: Set(dto.title),
        author: Set(dto.author),
        publisher: Set(dto.publisher),
        published_on: Set(dto.published_on),
        available: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = model.insert(db).await?;
    tracing::info!("Book {} created: {}", saved.id, saved.title);
    Ok(Book::from(saved))
}

pub async fn update_book(db: &DatabaseConnection, id: i32, dto: Book) -> Result<Book, DomainError> {
    validate(&dto)?;

    let existing = BookEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let mut model: book::ActiveModel = existing.into();
    model.title = Set(dto.title);
    model.author = Set(dto.author);
    model.publisher = Set(dto.publisher);
    model.published_on = Set(dto.published_on);
    model.updated_at = Set(Utc::now().to_rfc3339());

    let saved = model.update(db).await?;
    Ok(Book::from(saved))
}

/// Delete a book and its historical line items.
///
/// Refused with `Conflict` while any pending or approved request still
/// references the book, otherwise completing or rejecting that request
/// would silently skip the missing row.
pub async fn delete_book(db: &DatabaseConnection, id: i32) -> Result<(), DomainError> {
    BookEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let active_refs = LoanItem::find()
        .filter(loan_item::Column::BookId.eq(id))
        .join(JoinType::InnerJoin, loan_item::Relation::Request.def())
        .filter(loan_request::Column::Status.is_in([
            LoanStatus::Pending.as_str(),
            LoanStatus::Approved.as_str(),
        ]))
        .count(db)
        .await?;

    if active_refs > 0 {
        return Err(DomainError::Conflict(
            "book is referenced by an open loan request".to_string(),
        ));
    }

    let txn = db.begin().await?;

    LoanItem::delete_many()
        .filter(loan_item::Column::BookId.eq(id))
        .exec(&txn)
        .await?;
    BookEntity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!("Book {} deleted", id);
    Ok(())
}
