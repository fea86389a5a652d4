//! User domain

pub mod entity;
pub mod repository;

pub use entity::{ChangePassword, CreateUser, UpdateUser, User};
pub use repository::UserRepository;
