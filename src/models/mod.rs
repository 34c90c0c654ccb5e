pub mod book;
pub mod loan_item;
pub mod loan_request;
pub mod member;
pub mod user;

pub use book::Book;
pub use loan_request::LoanStatus;
