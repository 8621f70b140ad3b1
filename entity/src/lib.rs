pub mod deals;
pub mod executors;
