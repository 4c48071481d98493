pub mod engine;
pub mod error;
pub mod permissions;
pub mod reassembly;
