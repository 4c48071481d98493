pub mod access;
pub mod field;
pub mod filter;
pub mod modifiers;
pub mod request;
