pub mod contract;
pub mod indicator;
