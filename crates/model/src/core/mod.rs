pub mod identifiers;
pub mod key;
pub mod value;
