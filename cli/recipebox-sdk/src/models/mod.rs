pub mod catalog;
pub mod credential;
pub mod likes;
pub mod session;
pub mod view;
