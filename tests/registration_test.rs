use loanhub::auth;
use loanhub::db;
use loanhub::domain::DomainError;
use loanhub::models::{member, user};
use loanhub::services::member_service::{self, Registration};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

async fn setup_test_db() -> DatabaseConnection {
    db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB")
}

fn registration(username: &str) -> Registration {
    Registration {
        username: username.to_string(),
        password: "hunter2".to_string(),
        display_name: format!("{} display", username),
    }
}

#[tokio::test]
async fn test_register_creates_account_and_profile() {
    let db = setup_test_db().await;

    let (account, profile) = member_service::register(&db, registration("alice"))
        .await
        .expect("registration should succeed");

    assert_eq!(account.username, "alice");
    assert!(!account.is_staff);
    assert_eq!(profile.user_id, account.id);
    assert_eq!(profile.status, "active");
    assert_eq!(profile.photo_path, None);

    // Password is stored hashed and verifiable
    assert_ne!(account.password_hash, "hunter2");
    assert!(auth::verify_password("hunter2", &account.password_hash).unwrap());
    assert!(!auth::verify_password("wrong", &account.password_hash).unwrap());
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_blank_input() {
    let db = setup_test_db().await;

    member_service::register(&db, registration("alice"))
        .await
        .unwrap();

    let err = member_service::register(&db, registration("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let mut reg = registration("bob");
    reg.password = String::new();
    let err = member_service::register(&db, reg).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let mut reg = registration("  ");
    reg.username = "  ".to_string();
    let err = member_service::register(&db, reg).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // Failed attempts persisted nothing: one user, one profile
    let users = user::Entity::find().count(&db).await.unwrap();
    let profiles = member::Entity::find().count(&db).await.unwrap();
    assert_eq!(users, 1);
    assert_eq!(profiles, 1);

    let profile = member::Entity::find()
        .filter(member::Column::DisplayName.eq("alice display"))
        .one(&db)
        .await
        .unwrap();
    assert!(profile.is_some());
}

#[tokio::test]
async fn test_jwt_round_trip_carries_staff_flag() {
    let db = setup_test_db().await;

    let (account, _) = member_service::register(&db, registration("alice"))
        .await
        .unwrap();

    let token = auth::create_jwt(&account).expect("token issued");
    let claims = auth::decode_jwt(&token).expect("token decodes");
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.uid, account.id);
    assert!(!claims.staff);

    assert!(auth::decode_jwt("not-a-token").is_err());
}
