//! Demo data for local development, behind the SEED_DEMO env flag

use chrono::Local;
use sea_orm::*;

use crate::auth::hash_password;
use crate::models::{book, member, user};

pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    let now = chrono::Utc::now().to_rfc3339();
    let today = Local::now().format("%Y-%m-%d").to_string();

    // 1. Staff + member accounts
    let staff_password = hash_password("admin").unwrap();
    let member_password = hash_password("member").unwrap();

    let staff = user::ActiveModel {
        username: Set("admin".to_owned()),
        password_hash: Set(staff_password),
        is_staff: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };

    user::Entity::insert(staff)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(user::Column::Username)
                .do_nothing()
                .to_owned(),
        )
        .exec(db)
        .await?;

    let member_account = user::ActiveModel {
        username: Set("member".to_owned()),
        password_hash: Set(member_password),
        is_staff: Set(false),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };

    user::Entity::insert(member_account)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(user::Column::Username)
                .do_nothing()
                .to_owned(),
        )
        .exec(db)
        .await?;

    if let Some(account) = user::Entity::find()
        .filter(user::Column::Username.eq("member"))
        .one(db)
        .await?
    {
        let profile = member::ActiveModel {
            user_id: Set(account.id),
            display_name: Set("Demo Member".to_owned()),
            registered_on: Set(today),
            photo_path: Set(None),
            status: Set("active".to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        member::Entity::insert(profile)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(member::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(db)
            .await?;
    }

    // 2. A small catalog
    let titles = [
        ("The Hobbit", "J.R.R. Tolkien", "Allen & Unwin", "1937-09-21"),
        ("Foundation", "Isaac Asimov", "Gnome Press", "1951-06-01"),
        ("Dune", "Frank Herbert", "Chilton Books", "1965-08-01"),
    ];

    for (title, author, publisher, published_on) in titles {
        let existing = book::Entity::find()
            .filter(book::Column::Title.eq(title))
            .one(db)
            .await?;
        if existing.is_some() {
            continue;
        }

        let entry = book::ActiveModel {
            title: Set(title.to_owned()),
            author: Set(Some(author.to_owned())),
            publisher: Set(Some(publisher.to_owned())),
            published_on: Set(Some(published_on.to_owned())),
            available: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        entry.insert(db).await?;
    }

    Ok(())
}
