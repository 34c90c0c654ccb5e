use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_on: Option<String>,
    pub available: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::loan_item::Entity")]
    LoanItems,
}

impl Related<super::loan_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// DTO for API payloads
#[derive(Debug, Serialize, Deserialize)]
pub struct Book {
    pub id: Option<i32>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl From<Model> for Book {
    fn from(model: Model) -> Self {
        Self {
            id: Some(model.id),
            title: model.title,
            author: model.author,
            publisher: model.publisher,
            published_on: model.published_on,
            available: Some(model.available),
        }
    }
}

impl From<Book> for ActiveModel {
    fn from(book: Book) -> Self {
        Self {
            id: book.id.map_or(NotSet, Set),
            title: Set(book.title),
            author: Set(book.author),
            publisher: Set(book.publisher),
            published_on: Set(book.published_on),
            // availability is owned by the loan lifecycle, not the catalog payload
            available: NotSet,
            created_at: NotSet,
            updated_at: NotSet,
        }
    }
}
