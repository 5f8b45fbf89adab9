pub mod activity_log;
pub mod album;
pub mod comment;
pub mod family_config;
pub mod growth;
pub mod photo;
pub mod schedule;
