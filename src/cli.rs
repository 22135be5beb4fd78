//! Clap option structs for the two binaries

use clap::Parser;
use std::path::PathBuf;

use crate::protocol::DEFAULT_PORT;

/// Options for the driftsyncd daemon
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "driftsync server daemon")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "0.0.0.0:12100")]
    pub bind: String,

    /// Root directory to serve
    #[arg(long, default_value = "driftsync-backup")]
    pub root: PathBuf,

    /// Append sync events to this log file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Options for the driftsync client
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "driftsync - keep a local directory in step with a driftsync server"
)]
pub struct ClientOpts {
    /// Server host name or address
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Local directory to synchronize
    #[arg(long, default_value = "driftsync")]
    pub root: PathBuf,

    /// Append sync events to this log file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}
