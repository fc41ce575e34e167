use crate::persistence::Result;
use crate::replication::ReplicationSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub replication: ReplicationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Port of the HTTP status endpoints
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: NetworkConfig {
                host: "0.0.0.0".to_string(),
                port: 9851,
                http_port: 9852,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
            replication: ReplicationSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        config
            .replication
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid replication settings: {}", e))?;
        Ok(config)
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get HTTP status address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

/// Leader a server follows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowTarget {
    pub host: String,
    pub port: u16,
}

impl FollowTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for FollowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Runtime configuration persisted in the data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_port: Option<u16>,
    /// Credential sent to the leader with `AUTH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_auth: Option<String>,
    /// Password clients must `AUTH` with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirepass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_port: Option<u16>,
    #[serde(default)]
    pub read_only: bool,
}

impl PersistedConfig {
    pub fn follow_target(&self) -> Option<FollowTarget> {
        match (&self.follow_host, self.follow_port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(FollowTarget {
                host: host.clone(),
                port,
            }),
            _ => None,
        }
    }

    pub fn set_follow_target(&mut self, target: Option<FollowTarget>) {
        match target {
            Some(FollowTarget { host, port }) => {
                self.follow_host = Some(host);
                self.follow_port = Some(port);
            }
            None => {
                self.follow_host = None;
                self.follow_port = None;
            }
        }
    }
}

/// JSON-backed store for [`PersistedConfig`]
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: PersistedConfig,
}

impl ConfigStore {
    pub const FILE_NAME: &'static str = "config.json";

    /// Load `<data_dir>/config.json`, creating it (with a fresh server id)
    /// on first start
    pub async fn load_or_init(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(Self::FILE_NAME);

        let mut store = match tokio::fs::read(&path).await {
            Ok(raw) => Self {
                config: serde_json::from_slice(&raw)?,
                path,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self {
                config: PersistedConfig::default(),
                path,
            },
            Err(e) => return Err(e.into()),
        };

        if store.config.server_id.is_empty() {
            store.config.server_id = Uuid::new_v4().simple().to_string();
            info!("Generated server id {}", store.config.server_id);
            store.write(true).await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &PersistedConfig {
        &self.config
    }

    pub fn get_mut(&mut self) -> &mut PersistedConfig {
        &mut self.config
    }

    /// Write the config through a temp file and rename. `sync` also
    /// fsyncs the new file.
    pub async fn write(&self, sync: bool) -> Result<()> {
        Self::write_file(&self.path, &self.config, sync).await
    }

    /// Apply `change` to a copy, persist it, then adopt it. On a failed
    /// write the in-memory config is left as it was.
    pub async fn update<F>(&mut self, sync: bool, change: F) -> Result<()>
    where
        F: FnOnce(&mut PersistedConfig),
    {
        let mut next = self.config.clone();
        change(&mut next);
        Self::write_file(&self.path, &next, sync).await?;
        self.config = next;
        Ok(())
    }

    async fn write_file(path: &Path, config: &PersistedConfig, sync: bool) -> Result<()> {
        let data = serde_json::to_vec_pretty(config)?;
        let tmp = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        if sync {
            file.sync_all().await?;
        }
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
