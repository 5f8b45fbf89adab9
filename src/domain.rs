pub mod date_grouping;
pub mod entities;
pub mod use_cases;
