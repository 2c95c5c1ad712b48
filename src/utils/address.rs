// graphdb-backup/src/utils/address.rs
use crate::config::EndpointConfig;
use crate::errors::{BackupError, Result};

/// Returns the backup address as `host:port[,host:port...]`, `ip:port`, or
/// `<service>.<namespace>.svc.<cluster-domain>:port`, whichever source is set first.
pub fn generate_address(endpoints: &EndpointConfig) -> Result<String> {
    if !endpoints.endpoints.is_empty() {
        return Ok(endpoints.endpoints.clone());
    }

    // Legacy support for a single admin service IP
    if !endpoints.service_ip.is_empty() {
        return Ok(format!("{}:{}", endpoints.service_ip, endpoints.port));
    }

    if !endpoints.service_name.is_empty() {
        return Ok(format!(
            "{}.{}.svc.{}:{}",
            endpoints.service_name, endpoints.namespace, endpoints.cluster_domain, endpoints.port
        ));
    }

    Err(BackupError::Resolution)
}

/// Splits a resolved address into its individual `host:port` endpoints.
pub fn split_endpoints(address: &str) -> Vec<String> {
    address
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sources() -> EndpointConfig {
        EndpointConfig {
            endpoints: "10.3.3.2:6362,10.3.3.3:6362".into(),
            service_ip: "10.0.0.9".into(),
            service_name: "standalone-admin".into(),
            namespace: "default".into(),
            port: "6362".into(),
            cluster_domain: "cluster.local".into(),
        }
    }

    #[test]
    fn test_multi_endpoint_string_wins() -> anyhow::Result<()> {
        assert_eq!(generate_address(&all_sources())?, "10.3.3.2:6362,10.3.3.3:6362");
        Ok(())
    }

    #[test]
    fn test_legacy_ip_used_when_no_endpoints() -> anyhow::Result<()> {
        let config = EndpointConfig {
            endpoints: String::new(),
            ..all_sources()
        };
        assert_eq!(generate_address(&config)?, "10.0.0.9:6362");
        Ok(())
    }

    #[test]
    fn test_service_dns_name_is_last_resort() -> anyhow::Result<()> {
        let config = EndpointConfig {
            endpoints: String::new(),
            service_ip: String::new(),
            ..all_sources()
        };
        assert_eq!(
            generate_address(&config)?,
            "standalone-admin.default.svc.cluster.local:6362"
        );
        Ok(())
    }

    #[test]
    fn test_no_source_is_a_resolution_error() {
        let config = EndpointConfig {
            port: "6362".into(),
            namespace: "default".into(),
            ..EndpointConfig::default()
        };
        assert!(matches!(generate_address(&config), Err(BackupError::Resolution)));
    }

    #[test]
    fn test_split_endpoints_trims_whitespace() {
        assert_eq!(
            split_endpoints("10.3.3.2:6362, 10.3.3.3:6362 ,"),
            vec!["10.3.3.2:6362", "10.3.3.3:6362"]
        );
        assert_eq!(split_endpoints("db:6362"), vec!["db:6362"]);
    }
}
