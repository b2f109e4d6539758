use std::fs::File;
use std::io::{Read, Write};

use log::error;
use serde::Deserialize;

use crate::mapper::Protocol;

// ---------- Data structures ----------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where should the proxy listen for client connections?
    #[serde(rename = "bind-address")]
    pub bind_address: String,
    /// The real backend this proxy fronts.
    #[serde(rename = "backend-address")]
    pub backend_address: String,
    #[serde(default)]
    pub protocols: Protocols,
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Protocol revisions on either side of the bridge. When they differ, packet
/// bodies are run through the mapper in both directions.
#[derive(Debug, Clone, Deserialize)]
pub struct Protocols {
    #[serde(default = "default_frontend_protocol")]
    pub frontend: Protocol,
    #[serde(default = "default_backend_protocol")]
    pub backend: Protocol,
}

impl Default for Protocols {
    fn default() -> Self {
        Self {
            frontend: default_frontend_protocol(),
            backend: default_backend_protocol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// HTTP endpoint of the admin command service.
    #[serde(rename = "muip-endpoint", default = "default_muip_endpoint")]
    pub muip_endpoint: String,
    /// Command table console text is routed to.
    #[serde(rename = "command-channel", default = "default_command_channel")]
    pub command_channel: u32,
    /// Timeout for one command execution, in seconds.
    #[serde(rename = "timeout-secs", default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            muip_endpoint: default_muip_endpoint(),
            command_channel: default_command_channel(),
            timeout_secs: default_command_timeout(),
        }
    }
}

// ---------- Defaults ----------

fn default_frontend_protocol() -> Protocol {
    Protocol::from("5.0.0")
}

fn default_backend_protocol() -> Protocol {
    Protocol::from("4.6.0")
}

fn default_muip_endpoint() -> String {
    "http://127.0.0.1:8080/api/command".to_string()
}

fn default_command_channel() -> u32 {
    1116
}

fn default_command_timeout() -> u64 {
    5
}

// ---------- Loading ----------

/// Loads YAML from `config_path`. A missing file is replaced by a default
/// config written to disk, so a first run leaves something editable behind.
pub fn load_config(config_path: &str) -> Config {
    let mut contents = String::new();

    match File::open(config_path) {
        Ok(mut file) => {
            file.read_to_string(&mut contents)
                .expect("Failed to read config file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("Config file not found. Creating a default config file...");
            contents = default_config();
            let mut file =
                File::create(config_path).expect("Unable to create default config file");
            file.write_all(contents.as_bytes())
                .expect("Unable to write default config file");
        }
        Err(e) => {
            panic!("Error opening config file: {}", e);
        }
    }

    serde_yaml::from_str(&contents).expect("Failed to parse YAML config")
}

// A default config, just in case the file doesn't exist.
fn default_config() -> String {
    r#"# Default configuration for the bridging proxy.
# Where should the proxy listen for client connections?
bind-address: "0.0.0.0:22101"

# The real backend this proxy fronts.
backend-address: "127.0.0.1:22102"

# Protocol revisions on either side of the bridge.
protocols:
  frontend: "5.0.0"
  backend: "4.6.0"

# The admin console surfaced through chat and map marks.
console:
  # HTTP endpoint of the admin command service.
  muip-endpoint: "http://127.0.0.1:8080/api/command"
  # Command table console text is routed to.
  command-channel: 1116
  # Timeout for one command execution, in seconds.
  timeout-secs: 5
"#
    .to_string()
}
