use super::*;

/// Broadcast to every connection when the job set changes.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Fresh chain tip. Miners must abandon in-flight work.
    New(Arc<BlockTemplate>),
    /// Same tip with updated transactions. Old jobs remain valid.
    Refreshed(Arc<BlockTemplate>),
}

impl JobEvent {
    pub fn template(&self) -> &Arc<BlockTemplate> {
        match self {
            JobEvent::New(template) | JobEvent::Refreshed(template) => template,
        }
    }

    pub fn clean_jobs(&self) -> bool {
        matches!(self, JobEvent::New(_))
    }
}

/// Emitted for every submitted share, accepted or not, so payout and
/// statistics consumers see a single stream.
#[derive(Debug, Clone, Serialize)]
pub struct ShareEvent {
    pub job_id: JobId,
    pub remote: IpAddr,
    pub port: u16,
    pub worker: WorkerName,
    pub difficulty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reward: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_diff_actual: Option<f64>,
    /// Set only when the share met the network target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing)]
    pub block_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShareEvent {
    pub fn is_block(&self) -> bool {
        self.block_hash.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}
