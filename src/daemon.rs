use super::*;

/// One reply from one upstream daemon instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonReply {
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl DaemonReply {
    pub fn ok(response: Value) -> Self {
        Self {
            response: Some(response),
            error: None,
        }
    }

    pub fn result<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(error) = &self.error {
            bail!("daemon error: {error}");
        }

        let response = self
            .response
            .as_ref()
            .context("daemon returned an empty response")?;

        Ok(serde_json::from_value(response.clone())?)
    }
}

/// Upstream RPC seam. A pool usually fans one call out to several redundant
/// daemons and collects every reply, hence the `Vec`.
#[async_trait]
pub trait Daemon: Send + Sync {
    async fn cmd(&self, method: &str, params: Value) -> Result<Vec<DaemonReply>>;
}
