//! Services Layer
//!
//! Pure business logic extracted from HTTP handlers. Every function takes the
//! acting user explicitly; nothing here reads ambient session state.

pub mod book_service;
pub mod loan_service;
pub mod member_service;
