use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "siswa-server", about = "Student directory HTTP API")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "SISWA_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "SISWA_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Root directory of the uploaded image store.
    #[arg(long, env = "SISWA_STORAGE_DIR", default_value = "storage")]
    pub storage_dir: PathBuf,

    /// Externally reachable base URL; stored files are linked as `{public_url}/storage/...`.
    #[arg(long, env = "SISWA_PUBLIC_URL", default_value = "http://127.0.0.1:3000")]
    pub public_url: String,

    /// Upper bound on a request body, including both image uploads.
    #[arg(long, env = "SISWA_MAX_BODY_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_body_bytes: usize,
}
