use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Executes one console command on behalf of a player and returns the textual
/// result. Invoked from two independent paths (private chat text and map-mark
/// teleports) and stateless apart from the identifiers passed in.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, channel: u32, uid: u32, text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    channel: u32,
    uid: u32,
    cmd: &'a str,
}

#[derive(Deserialize)]
struct CommandResponse {
    retcode: i32,
    #[serde(default)]
    msg: String,
}

/// Command executor speaking to a remote admin HTTP service.
pub struct RemoteConsole {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteConsole {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build command client")?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl CommandExecutor for RemoteConsole {
    async fn execute(&self, channel: u32, uid: u32, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CommandRequest { channel, uid, cmd: text })
            .send()
            .await
            .context("command endpoint unreachable")?
            .error_for_status()
            .context("command endpoint rejected the request")?
            .json::<CommandResponse>()
            .await
            .context("malformed command response")?;
        if response.retcode != 0 {
            bail!("retcode {}: {}", response.retcode, response.msg);
        }
        Ok(response.msg)
    }
}
