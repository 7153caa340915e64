use std::net::SocketAddr;
use std::path::PathBuf;

use super::EngineConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("forkwiki.db")
    }

    /// Bare git repositories live under `<data_dir>/repos/<owner_id>/<repo_id>.git`.
    #[must_use]
    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            engine: EngineConfig::default(),
        }
    }
}
