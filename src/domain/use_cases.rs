pub mod growth;
pub mod photos;
pub mod schedules;
pub mod session;
