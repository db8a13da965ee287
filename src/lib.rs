pub mod benchmark;
pub mod config;
pub mod corpus;
pub mod error;
pub mod executor;
pub mod hashing;
pub mod level;
pub mod process;
pub mod report;
pub mod stats;
pub mod timing;
pub mod tuning;
