pub mod api;
pub mod config;
pub mod contracts;
pub mod crawler;
pub mod db;
pub mod error;
pub mod event_decoder;
pub mod memory;
pub mod normalizer;
pub mod persister;
pub mod report;
pub mod rpc;
pub mod scheduler;
pub mod transfers;
pub mod types;

pub use crawler::Crawler;
pub use db::{PgStore, Store};
pub use error::{CrawlerError, CrawlerResult};
pub use memory::MemoryStore;
pub use rpc::{ChainSource, RpcChainSource};
pub use scheduler::RangeScheduler;
