use clap::Parser;
use std::path::PathBuf;

/// Startup configuration. Every flag can also come from the environment so
/// the host app can spawn the sidecar without building a command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "clubd")]
#[command(about = "Evaluation capture and attendance sidecar (JSON lines over stdio)", long_about = None)]
pub struct Config {
    /// Open a local SQLite workspace at startup
    #[arg(long, env = "CLUBD_WORKSPACE", conflicts_with = "base_url")]
    pub workspace: Option<PathBuf>,

    /// Connect to a club REST server at startup (e.g. https://club.example/api)
    #[arg(long, env = "CLUBD_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token sent with every server request
    #[arg(long, env = "CLUBD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// User recorded as owner of evaluations created through this process
    #[arg(long, env = "CLUBD_USER_ID", default_value_t = 1)]
    pub user_id: i64,

    /// HTTP timeout in seconds
    #[arg(long, env = "CLUBD_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}
