pub mod abi;
pub mod aggregator;
pub mod api;
pub mod config;
pub mod db;
pub mod indexer;
pub mod mapping;
pub mod models;
pub mod networks;
pub mod parser;
pub mod price;
pub mod rpc;
pub mod tip;
