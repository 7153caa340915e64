mod engine;
mod server;

pub use engine::{CacheConfig, EngineConfig, ForkConfig, GraphConfig};
pub use server::ServerConfig;
