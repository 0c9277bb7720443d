pub mod property;
pub mod row_error;
