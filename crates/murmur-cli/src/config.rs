use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct MurmurConfig {
    pub journal: JournalSection,
    #[serde(default)]
    pub secrets: SecretsSection,
    #[serde(default)]
    pub security: SecuritySection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JournalSection {
    pub path: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SecretsSection {
    #[serde(default)]
    pub backend: SecretBackend,
    /// Directory for keyfiles; defaults to `<journal>.keys` next to the journal.
    #[serde(default)]
    pub keyfile_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default = "default_max_pin_attempts")]
    pub max_pin_attempts: u32,
    #[serde(default = "default_min_pin_length")]
    pub min_pin_length: usize,
    #[serde(default = "default_base_encrypted")]
    pub base_encrypted_by_default: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_pin_attempts: default_max_pin_attempts(),
            min_pin_length: default_min_pin_length(),
            base_encrypted_by_default: default_base_encrypted(),
        }
    }
}

fn default_max_pin_attempts() -> u32 {
    3
}

fn default_min_pin_length() -> usize {
    murmur_core::crypto::pin::MIN_PIN_LENGTH
}

fn default_base_encrypted() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    #[default]
    Keychain,
    Keyfile,
}

impl std::str::FromStr for SecretBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(SecretBackend::Keychain),
            "keyfile" => Ok(SecretBackend::Keyfile),
            other => Err(anyhow::anyhow!(
                "Unknown secret backend: {} (expected keychain or keyfile)",
                other
            )),
        }
    }
}

impl MurmurConfig {
    pub fn new(journal_path: PathBuf, backend: SecretBackend, keyfile_dir: Option<PathBuf>) -> Self {
        Self {
            journal: JournalSection {
                path: journal_path.to_string_lossy().to_string(),
            },
            secrets: SecretsSection {
                backend,
                keyfile_dir: keyfile_dir.map(|dir| dir.to_string_lossy().to_string()),
            },
            security: SecuritySection::default(),
        }
    }

    /// Keyfile directory, falling back to one next to the journal.
    pub fn keyfile_dir(&self) -> PathBuf {
        match self.secrets.keyfile_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_keyfile_dir(Path::new(&self.journal.path)),
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_journal_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("journal.db"))
}

pub fn default_keyfile_dir(journal_path: &Path) -> PathBuf {
    journal_path.with_extension("keys")
}

pub fn read_config(path: &Path) -> anyhow::Result<MurmurConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &MurmurConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("murmur"));
        }
    }
    Ok(home_dir()?.join(".config").join("murmur"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("murmur"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("murmur"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MurmurConfig = toml::from_str(
            r#"
[journal]
path = "/tmp/murmur/journal.db"
"#,
        )
        .unwrap();

        assert_eq!(config.secrets.backend, SecretBackend::Keychain);
        assert_eq!(config.security.max_pin_attempts, 3);
        assert_eq!(config.security.min_pin_length, 4);
        assert!(config.security.base_encrypted_by_default);
        assert_eq!(
            config.keyfile_dir(),
            PathBuf::from("/tmp/murmur/journal.keys")
        );
    }

    #[test]
    fn test_config_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = MurmurConfig::new(
            dir.path().join("journal.db"),
            SecretBackend::Keyfile,
            Some(dir.path().join("keys")),
        );

        write_config(&path, &config).unwrap();
        let loaded = read_config(&path).unwrap();

        assert_eq!(loaded.secrets.backend, SecretBackend::Keyfile);
        assert_eq!(loaded.keyfile_dir(), dir.path().join("keys"));
        assert_eq!(loaded.journal.path, config.journal.path);
    }

    #[test]
    fn test_security_overrides() {
        let config: MurmurConfig = toml::from_str(
            r#"
[journal]
path = "j.db"

[secrets]
backend = "keyfile"

[security]
max_pin_attempts = 1
base_encrypted_by_default = false
"#,
        )
        .unwrap();

        assert_eq!(config.security.max_pin_attempts, 1);
        assert_eq!(config.security.min_pin_length, 4);
        assert!(!config.security.base_encrypted_by_default);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(
            "Keyfile".parse::<SecretBackend>().unwrap(),
            SecretBackend::Keyfile
        );
        assert!("vault".parse::<SecretBackend>().is_err());
    }
}
