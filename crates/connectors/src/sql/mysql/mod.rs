pub mod params;
pub mod store;
