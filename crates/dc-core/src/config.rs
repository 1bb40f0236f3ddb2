//! Fleet configuration file (`clients.json`).
//!
//! ```json
//! {
//!   "port": 8080,
//!   "boinc": { "boinccmd": "boinccmd", "refresh": 10,
//!              "clients": [ { "name": "rig", "ip": "10.0.0.2", "port": 31416, "pwd": "..." } ] },
//!   "fah":   { "refresh": 15,
//!              "clients": [ { "name": "rig", "ip": "10.0.0.2", "port": 36330, "pwd": "...", "debug": true } ] }
//! }
//! ```
//!
//! Loaded once at startup; the polling core never reloads it.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{ClientConfig, ConfigError, ConfigResult, ProtocolFamily, DEFAULT_REFRESH};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetConfig {
    /// Listen port of the HTTP front-end (not used by the polling core)
    #[serde(default, rename = "port")]
    pub server_port: Option<u16>,
    #[serde(default)]
    pub boinc: FamilySection,
    #[serde(default)]
    pub fah: FamilySection,
}

/// Per-family section of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamilySection {
    /// Path to the external `boinccmd` tool (BOINC section only)
    #[serde(default)]
    pub boinccmd: Option<String>,
    /// Fallback refresh interval in seconds for clients without their own
    #[serde(default)]
    pub refresh: Option<f64>,
    #[serde(default)]
    pub clients: Vec<RawClientEntry>,
}

/// One client entry as written in the file.
#[derive(Clone, Default, Deserialize)]
pub struct RawClientEntry {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub pwd: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub refresh: Option<f64>,
}

impl std::fmt::Debug for RawClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawClientEntry")
            .field("name", &self.name)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl FleetConfig {
    /// Parses a configuration document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check_unique_names()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn section(&self, family: ProtocolFamily) -> &FamilySection {
        match family {
            ProtocolFamily::Boinc => &self.boinc,
            ProtocolFamily::Fah => &self.fah,
        }
    }

    /// All clients of every family with refresh defaults applied.
    pub fn client_configs(&self) -> Vec<ClientConfig> {
        ProtocolFamily::ALL
            .into_iter()
            .flat_map(|family| self.family_configs(family))
            .collect()
    }

    /// Clients of one family with refresh defaults applied.
    pub fn family_configs(&self, family: ProtocolFamily) -> Vec<ClientConfig> {
        let section = self.section(family);
        section
            .clients
            .iter()
            .map(|entry| ClientConfig {
                family,
                name: entry.name.clone(),
                address: entry.ip.clone(),
                port: entry.port,
                password: entry.pwd.clone(),
                debug: entry.debug,
                refresh: resolve_refresh(entry.refresh, section.refresh),
            })
            .collect()
    }

    fn check_unique_names(&self) -> ConfigResult<()> {
        for family in ProtocolFamily::ALL {
            let mut seen = HashSet::new();
            for entry in &self.section(family).clients {
                if !seen.insert(entry.name.as_str()) {
                    return Err(ConfigError::DuplicateClient(crate::ClientId::new(
                        family,
                        &entry.name,
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Picks the client's refresh, then the family's, then [`DEFAULT_REFRESH`].
///
/// Values below one second, NaN and infinities count as unset.
pub fn resolve_refresh(client: Option<f64>, family: Option<f64>) -> Duration {
    [client, family]
        .into_iter()
        .flatten()
        .find(|secs| secs.is_finite() && *secs >= 1.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_REFRESH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "port": 8080,
        "boinc": {
            "boinccmd": "/usr/bin/boinccmd",
            "refresh": 0,
            "clients": [
                {"name": "alpha", "ip": "10.0.0.2", "port": 31416, "pwd": "a", "refresh": 5},
                {"name": "beta", "ip": "10.0.0.3", "port": 31416, "pwd": "b"}
            ]
        },
        "fah": {
            "refresh": 15,
            "clients": [
                {"name": "alpha", "ip": "10.0.0.2", "port": 36330, "pwd": "c", "debug": true, "refresh": -1}
            ]
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = FleetConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.server_port, Some(8080));
        assert_eq!(config.boinc.boinccmd.as_deref(), Some("/usr/bin/boinccmd"));
        assert_eq!(config.client_configs().len(), 3);
    }

    #[test]
    fn test_refresh_resolution() {
        let config = FleetConfig::from_json_str(SAMPLE).unwrap();
        let boinc = config.family_configs(ProtocolFamily::Boinc);
        assert_eq!(boinc[0].refresh, Duration::from_secs(5));
        // family refresh of 0 is invalid, so the default applies
        assert_eq!(boinc[1].refresh, DEFAULT_REFRESH);

        let fah = config.family_configs(ProtocolFamily::Fah);
        assert_eq!(fah[0].refresh, Duration::from_secs(15));
        assert!(fah[0].debug);
        assert_eq!(fah[0].family, ProtocolFamily::Fah);
    }

    #[test]
    fn test_resolve_refresh_rules() {
        assert_eq!(resolve_refresh(None, None), DEFAULT_REFRESH);
        assert_eq!(resolve_refresh(Some(0.5), None), DEFAULT_REFRESH);
        assert_eq!(resolve_refresh(Some(f64::NAN), Some(3.0)), Duration::from_secs(3));
        assert_eq!(resolve_refresh(Some(2.0), Some(3.0)), Duration::from_secs(2));
    }

    #[test]
    fn test_same_name_in_different_families_is_allowed() {
        let config = FleetConfig::from_json_str(SAMPLE).unwrap();
        let ids: Vec<_> = config.client_configs().iter().map(|c| c.id()).collect();
        assert!(ids.iter().any(|id| id.as_str() == "boinc/alpha"));
        assert!(ids.iter().any(|id| id.as_str() == "fah/alpha"));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let json = r#"{"fah": {"clients": [{"name": "x", "ip": "h"}, {"name": "x", "ip": "h2"}]}}"#;
        let err = FleetConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateClient(id) if id.as_str() == "fah/x"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let config = FleetConfig::from_json_str("{}").unwrap();
        assert!(config.client_configs().is_empty());
        assert!(config.server_port.is_none());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = FleetConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = FleetConfig::from_path(file.path()).unwrap();
        assert_eq!(config.family_configs(ProtocolFamily::Boinc).len(), 2);
    }

    #[test]
    fn test_from_missing_path_is_io_error() {
        let err = FleetConfig::from_path("/nonexistent/dcollector/clients.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/dcollector/clients.json"));
    }

    #[test]
    fn test_raw_entry_debug_hides_password() {
        let config = FleetConfig::from_json_str(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.boinc.clients[0]);
        assert!(!rendered.contains("pwd"));
    }
}
