pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod ops;
pub mod scheduler;
pub mod slots;
pub mod storage;
pub mod worker;
