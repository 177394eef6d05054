pub mod generator;
pub mod lifecycle;
pub mod listing;
