pub mod applications;
pub mod auth;
pub mod comments;
pub mod feed;
pub mod jobs;
pub mod messages;
pub mod reviews;
pub mod stats;
pub mod storage;
pub mod users;
