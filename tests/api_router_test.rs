use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use loanhub::api;
use loanhub::auth;
use loanhub::db::{self, AppState};
use loanhub::models::{book, member, user};
use loanhub::services::loan_service;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot`

// Helper to create a test app state
async fn setup_test_state() -> AppState {
    let conn = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    AppState {
        conn,
        media_dir: "/tmp/loanhub_test_media".to_string(),
    }
}

fn test_app(state: AppState) -> Router {
    api::api_router(state)
}

async fn create_test_user(db: &DatabaseConnection, username: &str, is_staff: bool) -> user::Model {
    let now = chrono::Utc::now().to_rfc3339();
    let account = user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(auth::hash_password("secret").unwrap()),
        is_staff: Set(is_staff),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    account.insert(db).await.expect("Failed to create user")
}

async fn create_test_member(db: &DatabaseConnection, username: &str) -> (user::Model, i32) {
    let account = create_test_user(db, username, false).await;
    let now = chrono::Utc::now().to_rfc3339();
    let profile = member::ActiveModel {
        user_id: Set(account.id),
        display_name: Set(username.to_string()),
        registered_on: Set("2025-01-01".to_string()),
        photo_path: Set(None),
        status: Set("active".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    let profile = profile.insert(db).await.expect("Failed to create profile");
    (account, profile.id)
}

async fn create_test_book(db: &DatabaseConnection, title: &str) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let entry = book::ActiveModel {
        title: Set(title.to_string()),
        author: Set(Some("Author".to_string())),
        publisher: Set(Some("Publisher".to_string())),
        published_on: Set(Some("2000-01-01".to_string())),
        available: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    entry.insert(db).await.expect("Failed to create book").id
}

fn bearer(account: &user::Model) -> String {
    format!("Bearer {}", auth::create_jwt(account).expect("token"))
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::AUTHORIZATION, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_staff_gating_on_catalog_and_queue() {
    let state = setup_test_state().await;
    let (member_account, _) = create_test_member(&state.conn, "alice").await;
    let app = test_app(state);
    let member_token = bearer(&member_account);

    // No token at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/books/available")
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Members can browse the selectable set
    let response = app
        .clone()
        .oneshot(get("/books/available", &member_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // But the full catalog and book creation are staff-only
    let response = app
        .clone()
        .oneshot(get("/books", &member_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let payload = serde_json::json!({ "title": "Dune" });
    let response = app
        .clone()
        .oneshot(post_json("/books", &member_token, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // So is line-item removal
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/loans/items/1")
                .method("DELETE")
                .header(header::AUTHORIZATION, &member_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_conflict_and_invalid_transition_codes_differ() {
    let state = setup_test_state().await;
    let staff = create_test_user(&state.conn, "staff", true).await;
    let (_, member_a) = create_test_member(&state.conn, "alice").await;
    let (_, member_b) = create_test_member(&state.conn, "bob").await;
    let book_id = create_test_book(&state.conn, "The Hobbit").await;

    let first = loan_service::create_request(&state.conn, member_a, &[book_id])
        .await
        .unwrap();
    let second = loan_service::create_request(&state.conn, member_b, &[book_id])
        .await
        .unwrap();

    let app = test_app(state);
    let staff_token = bearer(&staff);
    let payload = serde_json::json!({ "due_date": "2025-01-10" });

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/loans/{}/approve", first.code),
            &staff_token,
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The contested book: 409 with code "conflict"
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/loans/{}/approve", second.code),
            &staff_token,
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["code"], "conflict");

    // Re-approving the winner: 409 with code "invalid_transition"
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/loans/{}/approve", first.code),
            &staff_token,
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["code"], "invalid_transition");

    // Missing due date: 400 with code "validation"
    let pending = serde_json::json!({});
    let response = app
        .oneshot(post_json(
            &format!("/loans/{}/approve", second.code),
            &staff_token,
            &pending,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn test_request_detail_scoped_to_owner() {
    let state = setup_test_state().await;
    let staff = create_test_user(&state.conn, "staff", true).await;
    let (alice, alice_member) = create_test_member(&state.conn, "alice").await;
    let (bob, _) = create_test_member(&state.conn, "bob").await;
    let book_id = create_test_book(&state.conn, "Dune").await;

    let request = loan_service::create_request(&state.conn, alice_member, &[book_id])
        .await
        .unwrap();

    let app = test_app(state);
    let uri = format!("/loans/{}", request.code);

    // Owner sees it
    let response = app
        .clone()
        .oneshot(get(&uri, &bearer(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["request"]["code"], request.code.as_str());

    // Staff see it
    let response = app
        .clone()
        .oneshot(get(&uri, &bearer(&staff)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Other members get a 404, not a 403, so codes stay unguessable
    let response = app
        .clone()
        .oneshot(get(&uri, &bearer(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Members listing /loans only see their own history
    let response = app.oneshot(get("/loans", &bearer(&bob))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_register_login_and_request_flow() {
    let state = setup_test_state().await;
    let book_id = create_test_book(&state.conn, "Foundation").await;
    let app = test_app(state);

    let payload = serde_json::json!({
        "username": "carol",
        "password": "hunter2",
        "display_name": "Carol",
    });
    let response = app
        .clone()
        .oneshot(post_json("/auth/register", "", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Duplicate registration reports a validation error
    let response = app
        .clone()
        .oneshot(post_json("/auth/register", "", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["code"], "validation");

    let login = serde_json::json!({ "username": "carol", "password": "hunter2" });
    let response = app
        .clone()
        .oneshot(post_json("/auth/login", "", &login))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let token = format!("Bearer {}", body["token"].as_str().expect("token issued"));
    assert_eq!(body["staff"], false);

    let bad_login = serde_json::json!({ "username": "carol", "password": "wrong" });
    let response = app
        .clone()
        .oneshot(post_json("/auth/login", "", &bad_login))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The fresh member can place a request with the issued token
    let payload = serde_json::json!({ "book_ids": [book_id] });
    let response = app
        .clone()
        .oneshot(post_json("/loans", &token, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["request"]["status"], "pending");

    // An empty selection is rejected at the boundary
    let payload = serde_json::json!({ "book_ids": [] });
    let response = app
        .oneshot(post_json("/loans", &token, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
