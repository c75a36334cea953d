pub mod aggregate;
pub mod coerce;
pub mod history;
pub mod normalize;
pub mod types;
