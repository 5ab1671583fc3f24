use super::*;

/// Outcome of a worker authorization attempt.
#[derive(Debug, Clone, Default)]
pub struct AuthReply {
    pub authorized: bool,
    pub disconnect: bool,
    pub error: Option<StratumError>,
}

impl AuthReply {
    pub fn allow() -> Self {
        Self {
            authorized: true,
            disconnect: false,
            error: None,
        }
    }

    pub fn deny(error: StratumError) -> Self {
        Self {
            authorized: false,
            disconnect: false,
            error: Some(error),
        }
    }
}

/// Policy seam for mining.authorize. Implementations may consult a
/// database, an upstream service, or nothing at all.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        remote: IpAddr,
        port: u16,
        worker: &WorkerName,
        password: Option<&str>,
    ) -> AuthReply;
}

/// Default policy: the worker name must start with a parseable base58check
/// address. Nothing else about the miner is trusted anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressAuthorizer;

#[async_trait]
impl Authorizer for AddressAuthorizer {
    async fn authorize(
        &self,
        _remote: IpAddr,
        _port: u16,
        worker: &WorkerName,
        _password: Option<&str>,
    ) -> AuthReply {
        match gen_tx::address_hash160(&worker.address) {
            Ok(_) => AuthReply::allow(),
            Err(_) => AuthReply::deny(StratumError::unauthorized_worker()),
        }
    }
}
