pub mod eval;
pub mod fixture;
pub mod store;
