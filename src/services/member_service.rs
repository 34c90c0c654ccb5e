//! Account and profile provisioning
//!
//! Registration creates the login account and the member profile in one
//! transaction; if either insert fails neither row is persisted.

use chrono::{Local, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::auth;
use crate::domain::DomainError;
use crate::models::member::{self, Entity as Member};
use crate::models::user::{self, Entity as User};

pub struct Registration {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

pub async fn register(
    db: &DatabaseConnection,
    reg: Registration,
) -> Result<(user::Model, member::Model), DomainError> {
    let username = reg.username.trim();
    if username.is_empty() {
        return Err(DomainError::Validation("username is required".to_string()));
    }
    if reg.password.is_empty() {
        return Err(DomainError::Validation("password is required".to_string()));
    }
    if reg.display_name.trim().is_empty() {
        return Err(DomainError::Validation(
            "display name is required".to_string(),
        ));
    }

    let existing = User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(DomainError::Validation(
            "username is already taken".to_string(),
        ));
    }

    let password_hash = auth::hash_password(&reg.password).map_err(DomainError::Internal)?;
    let now = Utc::now().to_rfc3339();

    let txn = db.begin().await?;

    let account = user::ActiveModel {
        username: Set(username.to_owned()),
        password_hash: Set(password_hash),
        is_staff: Set(false),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    let account = account.insert(&txn).await?;

    let profile = member::ActiveModel {
        user_id: Set(account.id),
        display_name: Set(reg.display_name.trim().to_owned()),
        registered_on: Set(Local::now().format("%Y-%m-%d").to_string()),
        photo_path: Set(None),
        status: Set("active".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    let profile = profile.insert(&txn).await?;

    txn.commit().await?;

    tracing::info!("Registered member {} (user {})", profile.id, account.id);
    Ok((account, profile))
}

/// Attach an uploaded photo to a member's profile
pub async fn set_photo(
    db: &DatabaseConnection,
    user_id: i32,
    photo_path: String,
) -> Result<member::Model, DomainError> {
    let profile = Member::find()
        .filter(member::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let mut model: member::ActiveModel = profile.into();
    model.photo_path = Set(Some(photo_path));
    model.updated_at = Set(Utc::now().to_rfc3339());

    Ok(model.update(db).await?)
}
