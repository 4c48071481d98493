pub mod compile;
pub mod error;
pub mod query;
