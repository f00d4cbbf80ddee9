pub mod admin;
pub mod applications;
pub mod auth;
pub mod comments;
pub mod form;
pub mod jobs;
pub mod messages;
pub mod profiles;
pub mod reviews;
