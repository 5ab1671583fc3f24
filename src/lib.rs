use {
    anyhow::{Context, Error, anyhow, bail, ensure},
    async_trait::async_trait,
    auth::Authorizer,
    bitcoin::{
        base58,
        hashes::{Hash, sha256, sha256d},
        opcodes,
        script::Builder,
    },
    byteorder::{LittleEndian, WriteBytesExt},
    daemon::Daemon,
    dashmap::DashMap,
    events::{JobEvent, ShareEvent},
    futures::{sink::SinkExt, stream::StreamExt},
    gen_tx::{GenerationTx, GenerationTxBuilder},
    hex::FromHex,
    job_manager::{JobManager, ShareSubmission},
    parking_lot::Mutex,
    policy::{CoinPolicy, FeeRecipient, RewardPlan, TxFormat},
    primitive_types::U256,
    rpc_data::{RpcBlockData, Subsidy},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::{Value, json},
    server::{BanTable, ConnectionCommand, ServerEvent},
    settings::{BanningSettings, PoolSettings, PortSettings},
    std::{
        collections::{HashMap, HashSet},
        fs,
        net::IpAddr,
        path::Path,
        sync::{Arc, LazyLock, OnceLock},
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Extranonce, Id, JobId, Message, Nonce, Notify, Ntime, SetTarget, StratumError,
        Submit, Subscribe, SubscribeResult, WorkerName,
    },
    template::BlockTemplate,
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::TcpListener,
        sync::{broadcast, mpsc},
        task::JoinSet,
    },
    tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
    tracing::{debug, info, warn},
    verify::{EquihashVerifier, HeaderDigest},
};

pub mod auth;
mod connection;
pub mod daemon;
pub mod events;
pub mod gen_tx;
pub mod job_manager;
mod merkle;
pub mod policy;
pub mod rpc_data;
pub mod server;
pub mod settings;
pub mod stratum;
pub mod template;
pub mod verify;

use connection::Connection;

pub const COIN_VALUE: u64 = 100_000_000;
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024;
/// Max ntime forward roll in seconds, matching the consensus 2-hour limit.
pub const MAX_NTIME_OFFSET: u64 = 7200;
pub const SUBSCRIPTION_PADDING: &str = "deadbeefcafebabe";
/// Shares just under target are kept if they clear this fraction of the
/// session difficulty, absorbing float rounding in miners.
pub const VARDIFF_GRACE: f64 = 0.99;
pub const JOB_CHANNEL_CAPACITY: usize = 32;
pub const SHARE_CHANNEL_CAPACITY: usize = 100_000;
pub const SERVER_CHANNEL_CAPACITY: usize = 256;

/// Highest target an Equihash chain accepts, the zcash powlimit. Difficulty
/// one is defined against this value.
pub static DIFF1: LazyLock<U256> = LazyLock::new(|| {
    let mut bytes = [0xffu8; 32];
    bytes[0] = 0x00;
    bytes[1] = 0x07;
    U256::from_big_endian(&bytes)
});

type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Lossy but monotonic, which is all difficulty math needs.
pub(crate) fn u256_to_f64(value: &U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .fold(0.0, |acc, (i, limb)| {
            acc + *limb as f64 * 2f64.powi(64 * i as i32)
        })
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff1_is_the_zcash_powlimit() {
        assert_eq!(
            hex::encode(DIFF1.to_big_endian()),
            "0007ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
        );
    }

    #[test]
    fn u256_conversion_is_monotonic() {
        assert_eq!(u256_to_f64(&U256::zero()), 0.0);
        assert_eq!(u256_to_f64(&U256::from(1u64)), 1.0);
        assert_eq!(u256_to_f64(&(U256::from(1u64) << 64)), 2f64.powi(64));
        assert!(u256_to_f64(&DIFF1) < u256_to_f64(&U256::MAX));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456789012, 9), 1.23456789);
        assert_eq!(round_to(0.9999999999, 9), 1.0);
        assert_eq!(round_to(16.0, 9), 16.0);
    }
}
