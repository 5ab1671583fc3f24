use super::*;

/// Normalized worker identity. Raw usernames arrive as
/// `<address>[_<suffix>][.<label>]` with arbitrary junk around them, and every
/// downstream consumer wants a payout address plus a rig label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerName {
    pub address: String,
    pub label: String,
}

impl WorkerName {
    pub fn parse(raw: &str) -> Self {
        let safe: String = raw
            .trim()
            .trim_matches('"')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();

        let mut parts = safe.splitn(2, '.');
        let account = parts.next().unwrap_or_default();
        let label = match parts.next() {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => "noname".to_string(),
        };

        let address = account.split('_').next().unwrap_or_default().to_string();

        WorkerName { address, label }
    }
}

impl Display for WorkerName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.label)
    }
}

impl Serialize for WorkerName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl FromStr for WorkerName {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(WorkerName::parse(s))
    }
}
