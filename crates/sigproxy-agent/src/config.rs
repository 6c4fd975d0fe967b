//! Proxy configuration and the signer registry
//!
//! Key configuration comes from two sources that are merged at startup:
//! the `start` command's flags (one key entry, client-id `"default"` when
//! unset) and a YAML config file shaped
//! `{key-configs: {config-1: {...}, config-2: {...}}}`.
//!
//! The registry loader is the only code path that touches private keys; it
//! returns a fully-populated, read-only map. Key passwords are consumed
//! during loading and are not retained afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use sigproxy_common::{Signer, SigningKey};

use crate::cli::StartArgs;

/// Sentinel client-id used as the fallback signer
pub const DEFAULT_CLIENT_KEY: &str = "default";

/// Deadline applied to each proxied request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between webhook pull iterations
pub const DEFAULT_PULL_DELAY: Duration = Duration::from_secs(1);

/// One signing key entry: which client it serves, where its key lives and
/// where its requests go.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    pub client_id: String,
    pub key_id: String,
    pub private_key: PathBuf,
    pub password: String,
    pub server_base_url: String,
}

impl KeyConfig {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_empty()
            && self.key_id.is_empty()
            && self.password.is_empty()
            && self.private_key.as_os_str().is_empty()
            && self.server_base_url.is_empty()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_id.is_empty() {
            bail!("keyID is empty");
        }
        if !self.private_key.exists() {
            bail!(
                "private key file not exists: {}",
                self.private_key.display()
            );
        }
        if self.server_base_url.is_empty() || Url::parse(&self.server_base_url).is_err() {
            bail!("base url is empty or invalid");
        }
        if self.client_id != DEFAULT_CLIENT_KEY && Uuid::parse_str(&self.client_id).is_err() {
            bail!("clientID is not a valid uuid");
        }
        Ok(())
    }
}

/// Runtime configuration for one proxy process
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub default_timeout: Duration,
    pub pull_delay: Duration,
    pub verbose_mode: bool,
    pub log_headers: bool,
    pub events: Vec<String>,
    pub listen: bool,
    pub key_configs: Vec<KeyConfig>,
}

impl Config {
    /// Merge CLI flags and the optional YAML config file.
    pub fn load(args: &StartArgs, config_file: Option<&Path>) -> anyhow::Result<Self> {
        let mut key_configs = Vec::new();

        let flag_config = KeyConfig {
            client_id: args.client_id.clone().unwrap_or_default(),
            key_id: args.key_id.clone().unwrap_or_default(),
            private_key: args.private_key.clone().unwrap_or_default(),
            password: args.private_key_password.clone().unwrap_or_default(),
            server_base_url: args.server_base_url.clone().unwrap_or_default(),
        };
        if !flag_config.is_empty() {
            let mut flag_config = flag_config;
            if flag_config.client_id.is_empty() {
                flag_config.client_id = DEFAULT_CLIENT_KEY.to_string();
            }
            key_configs.push(flag_config);
        }

        match config_file {
            Some(path) => {
                key_configs.extend(read_config_file(path)?);
            }
            None => {
                if let Some(path) = default_config_path() {
                    if path.exists() {
                        key_configs.extend(read_config_file(&path)?);
                    }
                }
            }
        }

        Ok(Self {
            port: args.port,
            default_timeout: DEFAULT_TIMEOUT,
            pull_delay: DEFAULT_PULL_DELAY,
            verbose_mode: args.verbose_mode,
            log_headers: args.show_webhook_headers,
            events: args.events.clone(),
            listen: args.listen,
            key_configs,
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".sigproxy.yaml"))
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "key-configs", default)]
    key_configs: BTreeMap<String, FileKeyConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileKeyConfig {
    client_id: String,
    private_key: PathBuf,
    #[serde(default)]
    private_key_password: String,
    server_base_url: String,
    key_id: String,
}

fn read_config_file(path: &Path) -> anyhow::Result<Vec<KeyConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed: ConfigFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(parsed
        .key_configs
        .into_values()
        .map(|c| KeyConfig {
            client_id: c.client_id,
            key_id: c.key_id,
            private_key: c.private_key,
            password: c.private_key_password,
            server_base_url: c.server_base_url,
        })
        .collect())
}

/// One registered signer: the key plus the upstream its requests are piped to
#[derive(Debug, Clone)]
pub struct SignerEntry {
    pub signer: Arc<Signer>,
    pub base_url: Url,
}

/// Read-only mapping from client-id to signer, built once at startup.
#[derive(Debug, Default)]
pub struct SignerRegistry {
    entries: HashMap<String, SignerEntry>,
}

impl SignerRegistry {
    /// Validate every key config, load and decrypt the keys, and build the
    /// registry. Consumes the configs so the key passwords go out of scope
    /// here.
    pub fn from_configs(configs: Vec<KeyConfig>) -> anyhow::Result<Self> {
        let mut entries = HashMap::new();
        for config in configs {
            config.validate().with_context(|| {
                format!(
                    "invalid configuration for clientID {:?} (keyID {:?}, privateKey {}, baseUrl {:?})",
                    config.client_id,
                    config.key_id,
                    config.private_key.display(),
                    config.server_base_url,
                )
            })?;

            let pem = std::fs::read(&config.private_key).with_context(|| {
                format!("failed to read private key {}", config.private_key.display())
            })?;
            let key = SigningKey::from_pem(&pem, &config.password).with_context(|| {
                format!("failed to parse private key {}", config.private_key.display())
            })?;
            let base_url = Url::parse(&config.server_base_url)?;

            let entry = SignerEntry {
                signer: Arc::new(Signer::new(config.key_id, key)),
                base_url,
            };
            if entries.insert(config.client_id.clone(), entry).is_some() {
                bail!("ClientID duplicated in configuration");
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, client_id: &str) -> Option<&SignerEntry> {
        self.entries.get(client_id)
    }

    /// Look up a client-id, falling back to the `"default"` entry. The bool
    /// reports whether the fallback was used.
    pub fn get_or_default(&self, client_id: &str) -> Option<(&SignerEntry, bool)> {
        if let Some(entry) = self.entries.get(client_id) {
            return Some((entry, false));
        }
        self.entries.get(DEFAULT_CLIENT_KEY).map(|e| (e, true))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::symm::Cipher;

    fn write_test_key(password: &str) -> PathBuf {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        let pem = key
            .private_key_to_pem_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
            .unwrap();
        let path = std::env::temp_dir().join(format!("sigproxy-cfg-{}.pem", Uuid::new_v4()));
        std::fs::write(&path, pem).unwrap();
        path
    }

    fn key_config(client_id: &str, path: &Path) -> KeyConfig {
        KeyConfig {
            client_id: client_id.to_string(),
            key_id: "key_id".to_string(),
            private_key: path.to_path_buf(),
            password: "123456".to_string(),
            server_base_url: "http://localhost:3001".to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_missing_key_file() {
        let config = key_config("default", Path::new("/nonexistent/key.pem"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not exists"));
    }

    #[test]
    fn test_validate_rejects_bad_client_id() {
        let path = write_test_key("123456");
        let config = key_config("not-a-uuid", &path);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a valid uuid"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_registry_duplicate_client_id() {
        let path = write_test_key("123456");
        let id = Uuid::new_v4().to_string();
        let configs = vec![key_config(&id, &path), key_config(&id, &path)];
        let err = SignerRegistry::from_configs(configs).unwrap_err();
        assert!(err
            .to_string()
            .contains("ClientID duplicated in configuration"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_registry_default_fallback() {
        let path = write_test_key("123456");
        let registry =
            SignerRegistry::from_configs(vec![key_config("default", &path)]).unwrap();
        let (entry, used_default) = registry
            .get_or_default(&Uuid::new_v4().to_string())
            .unwrap();
        assert!(used_default);
        assert_eq!(entry.signer.key_id(), "key_id");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_yaml_config_file() {
        let path = write_test_key("123456");
        let yaml = format!(
            r#"
key-configs:
  config-1:
    client-id: "default"
    private-key: "{key}"
    private-key-password: "123456"
    server-base-url: "http://localhost:3001"
    key-id: "key_id"
  config-2:
    client-id: "{uuid}"
    private-key: "{key}"
    private-key-password: "123456"
    server-base-url: "http://localhost:3002"
    key-id: "key_id_2"
"#,
            key = path.display(),
            uuid = Uuid::new_v4(),
        );
        let config_path = std::env::temp_dir().join(format!("sigproxy-{}.yaml", Uuid::new_v4()));
        std::fs::write(&config_path, yaml).unwrap();

        let configs = read_config_file(&config_path).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].client_id, "default");
        assert_eq!(configs[1].key_id, "key_id_2");

        let registry = SignerRegistry::from_configs(configs).unwrap();
        assert_eq!(registry.len(), 2);

        std::fs::remove_file(&config_path).ok();
        std::fs::remove_file(&path).ok();
    }
}
