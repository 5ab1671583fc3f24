use super::*;

pub type Result<T, E = InternalError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum InternalError {
    #[snafu(display("{message}"))]
    Parse { message: String },
}

/// Wire form of a stratum error: a [code, message, traceback] triple.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub error_code: i32,
    pub message: String,
    pub traceback: Option<Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.error_code, &self.message, &self.traceback).serialize(serializer)
    }
}

impl Display for JsonRpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Stratum error {}: {}", self.error_code, self.message)
    }
}

/// Share and session rejections use the classic stratum pool code table:
/// 20 malformed, 21 stale job, 22 duplicate, 23 low difficulty,
/// 24 unauthorized, 25 not subscribed.
#[derive(Debug, Clone, PartialEq)]
pub struct StratumError {
    pub code: i32,
    pub message: String,
}

impl StratumError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            code: 20,
            message: message.into(),
        }
    }

    pub fn job_not_found() -> Self {
        Self {
            code: 21,
            message: "job not found".into(),
        }
    }

    pub fn duplicate_share() -> Self {
        Self {
            code: 22,
            message: "duplicate share".into(),
        }
    }

    pub fn low_difficulty(share_difficulty: f64) -> Self {
        Self {
            code: 23,
            message: format!("low difficulty share of {share_difficulty}"),
        }
    }

    pub fn unauthorized_worker() -> Self {
        Self {
            code: 24,
            message: "unauthorized worker".into(),
        }
    }

    pub fn not_subscribed() -> Self {
        Self {
            code: 25,
            message: "not subscribed".into(),
        }
    }

    pub fn to_wire(&self) -> JsonRpcError {
        JsonRpcError {
            error_code: self.code,
            message: self.message.clone(),
            traceback: None,
        }
    }
}

impl Display for StratumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StratumError {}
