use crate::api;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::books::list_books,
        api::books::list_available_books,
        api::books::create_book,
        api::books::delete_book,
    ),
    tags(
        (name = "loanhub", description = "Library loan management API")
    )
)]
pub struct ApiDoc;
