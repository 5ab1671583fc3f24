use super::*;

/// Pool runtime configuration, one instance per coin.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    pub pool_address: String,
    #[serde(default)]
    pub pool_sig: String,
    #[serde(default)]
    pub recipients: Vec<FeeRecipient>,
    /// Seeds the extranonce1 space so pool instances behind one load
    /// balancer never hand out overlapping work.
    #[serde(default)]
    pub instance_id: Option<u32>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_job_rebroadcast_timeout")]
    pub job_rebroadcast_timeout: u64,
    pub ports: Vec<PortSettings>,
    #[serde(default)]
    pub banning: Option<BanningSettings>,
}

fn default_connection_timeout() -> u64 {
    600
}

fn default_job_rebroadcast_timeout() -> u64 {
    55
}

impl PoolSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from `{}`", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings from `{}`", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result {
        ensure!(!self.ports.is_empty(), "at least one port is required");
        ensure!(!self.pool_address.is_empty(), "pool_address is required");
        Ok(())
    }

    pub fn port(&self, port: u16) -> Option<&PortSettings> {
        self.ports.iter().find(|p| p.port == port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortSettings {
    pub port: u16,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    /// Expect a PROXY protocol v1 preamble from the load balancer.
    #[serde(default)]
    pub proxy_protocol: bool,
}

fn default_difficulty() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BanningSettings {
    #[serde(default = "default_ban_time")]
    pub time: u64,
    #[serde(default = "default_invalid_percent")]
    pub invalid_percent: f64,
    #[serde(default = "default_check_threshold")]
    pub check_threshold: u64,
    #[serde(default = "default_purge_interval")]
    pub purge_interval: u64,
    /// Statically denied addresses, never unbanned.
    #[serde(default)]
    pub banned: Vec<IpAddr>,
}

fn default_ban_time() -> u64 {
    600
}

fn default_invalid_percent() -> f64 {
    50.0
}

fn default_check_threshold() -> u64 {
    500
}

fn default_purge_interval() -> u64 {
    300
}

impl Default for BanningSettings {
    fn default() -> Self {
        Self {
            time: default_ban_time(),
            invalid_percent: default_invalid_percent(),
            check_threshold: default_check_threshold(),
            purge_interval: default_purge_interval(),
            banned: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(json: &str) -> PoolSettings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal() {
        let settings = settings(
            r#"{
                "pool_address": "t1ePool",
                "ports": [{"port": 3333}]
            }"#,
        );

        settings.validate().unwrap();
        assert_eq!(settings.connection_timeout, 600);
        assert_eq!(settings.job_rebroadcast_timeout, 55);
        assert_eq!(settings.ports[0].difficulty, 1.0);
        assert!(!settings.ports[0].proxy_protocol);
        assert!(settings.banning.is_none());
        assert!(settings.instance_id.is_none());
    }

    #[test]
    fn full() {
        let settings = settings(
            r#"{
                "pool_address": "t1ePool",
                "pool_sig": "equipool",
                "recipients": [{"address": "t1eFee", "percent": 1.0}],
                "instance_id": 5,
                "connection_timeout": 120,
                "job_rebroadcast_timeout": 30,
                "ports": [
                    {"port": 3333, "difficulty": 0.5},
                    {"port": 3334, "difficulty": 64.0, "proxy_protocol": true}
                ],
                "banning": {
                    "time": 900,
                    "invalid_percent": 25.0,
                    "check_threshold": 100,
                    "banned": ["203.0.113.7"]
                }
            }"#,
        );

        assert_eq!(settings.recipients[0].percent, 1.0);
        assert_eq!(settings.instance_id, Some(5));
        assert_eq!(settings.port(3334).unwrap().difficulty, 64.0);
        assert!(settings.port(3334).unwrap().proxy_protocol);
        assert!(settings.port(9999).is_none());

        let banning = settings.banning.unwrap();
        assert_eq!(banning.time, 900);
        assert_eq!(banning.purge_interval, 300);
        assert_eq!(banning.banned, vec!["203.0.113.7".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(
            serde_json::from_str::<PoolSettings>(
                r#"{"pool_address": "a", "ports": [], "bogus": 1}"#
            )
            .is_err()
        );
    }

    #[test]
    fn validate_requires_ports() {
        let settings = settings(r#"{"pool_address": "t1ePool", "ports": []}"#);
        assert!(settings.validate().is_err());
    }
}
