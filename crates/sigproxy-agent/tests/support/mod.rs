//! Shared fixtures for the end-to-end suites: throwaway EC keys on disk and
//! proxy configurations pointed at mock upstreams.
#![allow(dead_code)] // each test binary uses a different subset

use std::path::PathBuf;
use std::time::Duration;

use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::Private;
use openssl::symm::Cipher;
use uuid::Uuid;

use sigproxy_agent::config::{Config, KeyConfig};

pub const TEST_PASSWORD: &str = "123456";

/// A generated P-256 key written to a password-encrypted PEM file, removed
/// on drop.
pub struct TestKey {
    pub key: EcKey<Private>,
    pub path: PathBuf,
}

impl TestKey {
    pub fn generate() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        let pem = key
            .private_key_to_pem_passphrase(Cipher::aes_128_cbc(), TEST_PASSWORD.as_bytes())
            .unwrap();
        let path = std::env::temp_dir().join(format!("sigproxy-test-{}.pem", Uuid::new_v4()));
        std::fs::write(&path, pem).unwrap();
        Self { key, path }
    }
}

impl Drop for TestKey {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

pub fn key_config(client_id: &str, key_id: &str, key: &TestKey, base_url: &str) -> KeyConfig {
    KeyConfig {
        client_id: client_id.to_string(),
        key_id: key_id.to_string(),
        private_key: key.path.clone(),
        password: TEST_PASSWORD.to_string(),
        server_base_url: base_url.to_string(),
    }
}

/// Config for an ephemeral-port proxy with a fast pull loop
pub fn test_config(key_configs: Vec<KeyConfig>) -> Config {
    Config {
        port: 0,
        default_timeout: Duration::from_secs(30),
        pull_delay: Duration::from_millis(50),
        verbose_mode: false,
        log_headers: false,
        events: Vec::new(),
        listen: false,
        key_configs,
    }
}

/// Poll `condition` until it holds or the deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
