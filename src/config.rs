use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detector::PXE_CLASS_ID;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pxebootd.conf";
const DEFAULT_BOOT_FILE: &str = "boot.bin";
const DEFAULT_DHCP_PORT: u16 = 67;
const DEFAULT_CLIENT_PORT: u16 = 68;
const DEFAULT_TFTP_PORT: u16 = 69;
const DEFAULT_TFTP_TIMEOUT_SECS: u64 = 5;

/// Longest boot file name that fits the 128-byte `file` field with its NUL.
pub const MAX_BOOT_FILE_LEN: usize = 127;
/// Longest vendor class that fits a single DHCP option.
pub const MAX_VENDOR_CLASS_LEN: usize = 255;

const ENV_PREFIX: &str = "PXEBOOTD_";

/// Keys accepted in the config file and as `PXEBOOTD_<KEY>` variables.
const KEYS: &[&str] = &[
    "server_ip",
    "boot_file",
    "vendor_class",
    "bind_address",
    "dhcp_port",
    "client_port",
    "reply_address",
    "interface",
    "tftp_enabled",
    "tftp_root",
    "tftp_port",
    "tftp_timeout_secs",
    "tftp_allow_write",
    "log",
    "debug",
];

/// What a PXE client is told in the offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    /// TFTP/boot server address, also the DHCP server identifier
    pub server_ip: Ipv4Addr,
    /// File name placed in the BOOTP `file` field
    pub boot_file: String,
    /// Vendor class matched on requests and echoed in offers
    pub vendor_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpConfig {
    pub bind_address: Ipv4Addr,
    pub port: u16,
    /// Destination port for offers
    pub client_port: u16,
    /// Destination address for offers
    pub reply_address: Ipv4Addr,
    /// Restrict the listener to one interface (Linux only)
    pub interface: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TftpConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub port: u16,
    pub timeout: Duration,
    pub allow_write: bool,
}

/// Static server configuration, shared read-only by every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub boot: BootConfig,
    pub dhcp: DhcpConfig,
    pub tftp: TftpConfig,
    /// Log per-packet decisions
    pub log: bool,
    /// Hex-dump request and reply bytes
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boot: BootConfig {
                server_ip: Ipv4Addr::UNSPECIFIED,
                boot_file: DEFAULT_BOOT_FILE.to_string(),
                vendor_class: PXE_CLASS_ID.to_string(),
            },
            dhcp: DhcpConfig {
                bind_address: Ipv4Addr::UNSPECIFIED,
                port: DEFAULT_DHCP_PORT,
                client_port: DEFAULT_CLIENT_PORT,
                reply_address: Ipv4Addr::BROADCAST,
                interface: None,
            },
            tftp: TftpConfig {
                enabled: true,
                root: PathBuf::from("."),
                port: DEFAULT_TFTP_PORT,
                timeout: Duration::from_secs(DEFAULT_TFTP_TIMEOUT_SECS),
                allow_write: false,
            },
            log: false,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from `path` (if it exists), then apply
    /// `PXEBOOTD_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config.set(key.trim(), value.trim())?;
            }
        }

        Ok(config)
    }

    /// Apply overrides for every known key found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.to_uppercase());
            if let Some(value) = lookup(&var) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    /// Set a single key. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "server_ip" => self.boot.server_ip = parse_value(key, value)?,
            "boot_file" => self.boot.boot_file = value.to_string(),
            "vendor_class" => self.boot.vendor_class = value.to_string(),
            "bind_address" => self.dhcp.bind_address = parse_value(key, value)?,
            "dhcp_port" => self.dhcp.port = parse_value(key, value)?,
            "client_port" => self.dhcp.client_port = parse_value(key, value)?,
            "reply_address" => self.dhcp.reply_address = parse_value(key, value)?,
            "interface" => {
                self.dhcp.interface = (!value.is_empty()).then(|| value.to_string());
            }
            "tftp_enabled" => self.tftp.enabled = parse_bool(key, value)?,
            "tftp_root" => self.tftp.root = PathBuf::from(value),
            "tftp_port" => self.tftp.port = parse_value(key, value)?,
            "tftp_timeout_secs" => {
                self.tftp.timeout = Duration::from_secs(parse_value(key, value)?);
            }
            "tftp_allow_write" => self.tftp.allow_write = parse_bool(key, value)?,
            "log" => self.log = parse_bool(key, value)?,
            "debug" => self.debug = parse_bool(key, value)?,
            _ => {}
        }
        Ok(())
    }

    /// Check the values the wire encoder and the servers rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boot.server_ip.is_unspecified() {
            return Err(ConfigError::Invalid(
                "server_ip must be set to the TFTP server address".to_string(),
            ));
        }

        let boot_file = &self.boot.boot_file;
        if boot_file.is_empty() || boot_file.len() > MAX_BOOT_FILE_LEN {
            return Err(ConfigError::Invalid(format!(
                "boot_file must be 1 to {} bytes, got {}",
                MAX_BOOT_FILE_LEN,
                boot_file.len()
            )));
        }
        if boot_file.contains('\0') {
            return Err(ConfigError::Invalid(
                "boot_file must not contain NUL".to_string(),
            ));
        }

        let vendor_class = &self.boot.vendor_class;
        if vendor_class.is_empty() || vendor_class.len() > MAX_VENDOR_CLASS_LEN {
            return Err(ConfigError::Invalid(format!(
                "vendor_class must be 1 to {} bytes, got {}",
                MAX_VENDOR_CLASS_LEN,
                vendor_class.len()
            )));
        }

        if self.tftp.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "tftp_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Default tracing filter derived from the verbosity flags.
    pub fn tracing_filter(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.log {
            "debug"
        } else {
            "info"
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.boot.server_ip = Ipv4Addr::new(192, 168, 1, 49);
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.boot.boot_file, "boot.bin");
        assert_eq!(config.boot.vendor_class, "PXEClient");
        assert_eq!(config.dhcp.port, 67);
        assert_eq!(config.dhcp.client_port, 68);
        assert_eq!(config.dhcp.reply_address, Ipv4Addr::BROADCAST);
        assert_eq!(config.tftp.port, 69);
        assert_eq!(config.tftp.timeout, Duration::from_secs(5));
        assert!(config.tftp.enabled);
        assert!(!config.tftp.allow_write);
        assert!(!config.log);
        assert!(!config.debug);
    }

    #[test]
    fn test_parse_file_content() {
        let content = "\
# PXE boot assistant
server_ip = 10.0.0.5
boot_file = pxelinux.0

dhcp_port=1067
tftp_root = /srv/tftp
tftp_timeout_secs = 10
tftp_allow_write = yes
interface = eth1
log = true
unknown_key = ignored
";
        let config = Config::parse(content).unwrap();
        assert_eq!(config.boot.server_ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(config.boot.boot_file, "pxelinux.0");
        assert_eq!(config.dhcp.port, 1067);
        assert_eq!(config.dhcp.interface.as_deref(), Some("eth1"));
        assert_eq!(config.tftp.root, PathBuf::from("/srv/tftp"));
        assert_eq!(config.tftp.timeout, Duration::from_secs(10));
        assert!(config.tftp.allow_write);
        assert!(config.log);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_port() {
        let err = Config::parse("dhcp_port = abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "dhcp_port"));
    }

    #[test]
    fn test_parse_invalid_bool() {
        assert!(Config::parse("debug = maybe").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PXEBOOTD_SERVER_IP", "172.16.0.1"),
            ("PXEBOOTD_TFTP_ENABLED", "false"),
            ("PXEBOOTD_DEBUG", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::parse("server_ip = 10.0.0.5").unwrap();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.boot.server_ip, Ipv4Addr::new(172, 16, 0, 1));
        assert!(!config.tftp.enabled);
        assert!(config.debug);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.conf")).unwrap();
        assert_eq!(config.boot.boot_file, "boot.bin");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pxebootd.conf");
        std::fs::write(&path, "server_ip = 192.168.1.49\nboot_file = undionly.kpxe\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.boot.boot_file, "undionly.kpxe");
    }

    #[test]
    fn test_validate_requires_server_ip() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("server_ip"));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_boot_file_length() {
        let mut config = valid_config();
        config.boot.boot_file = "a".repeat(MAX_BOOT_FILE_LEN);
        assert!(config.validate().is_ok());

        config.boot.boot_file = "a".repeat(MAX_BOOT_FILE_LEN + 1);
        assert!(config.validate().is_err());

        config.boot.boot_file = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_vendor_class_length() {
        let mut config = valid_config();
        config.boot.vendor_class = String::new();
        assert!(config.validate().is_err());

        config.boot.vendor_class = "x".repeat(MAX_VENDOR_CLASS_LEN + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeout() {
        let mut config = valid_config();
        config.tftp.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracing_filter() {
        let mut config = valid_config();
        assert_eq!(config.tracing_filter(), "info");
        config.log = true;
        assert_eq!(config.tracing_filter(), "debug");
        config.debug = true;
        assert_eq!(config.tracing_filter(), "trace");
    }
}
