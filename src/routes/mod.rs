pub mod ask;
pub mod dashboard;
