// graphdb-backup/src/utils/setting.rs
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use super::address::split_endpoints;
use crate::errors::{BackupError, Result};

/// Probes every endpoint of `address` over TCP; the cluster counts as reachable when at
/// least one member accepts a connection within `connect_timeout`.
pub async fn check_database_connectivity(address: &str, connect_timeout: Duration) -> Result<()> {
    let endpoints = split_endpoints(address);
    if endpoints.is_empty() {
        return Err(BackupError::Resolution);
    }

    let mut failures = Vec::new();
    for endpoint in &endpoints {
        match timeout(connect_timeout, TcpStream::connect(endpoint.as_str())).await {
            Ok(Ok(_)) => {
                info!(endpoint = %endpoint, "✅ Successfully connected to backup endpoint");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint, error = %e, "Backup endpoint refused connection");
                failures.push(format!("{}: {}", endpoint, e));
            }
            Err(_) => {
                warn!(endpoint = %endpoint, timeout = ?connect_timeout, "Backup endpoint timed out");
                failures.push(format!("{}: timed out after {:?}", endpoint, connect_timeout));
            }
        }
    }

    Err(BackupError::Connectivity(failures.join("; ")))
}
