//! Flat rows back into the requested shape.

pub mod merge;
pub mod rows;

pub use merge::{ChildWindow, discriminates, merge_many, merge_one, merge_union};
pub use rows::reassemble;
