use {
    crate::DIFF1,
    derive_more::Display,
    error::Result,
    hex::FromHex,
    primitive_types::{U256, U512},
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::SerializeSeq,
    },
    serde_json::Value,
    serde_with::{DeserializeFromStr, SerializeDisplay},
    snafu::Snafu,
    std::{
        fmt::{self, Display, Formatter},
        str::FromStr,
    },
};

mod authorize;
mod error;
mod extranonce;
mod job_id;
mod message;
mod nonce;
mod notify;
mod ntime;
mod set_target;
mod submit;
mod subscribe;
mod worker_name;

pub use {
    authorize::Authorize,
    error::{InternalError, JsonRpcError, StratumError},
    extranonce::Extranonce,
    job_id::JobId,
    message::{Id, Message},
    nonce::Nonce,
    notify::Notify,
    ntime::Ntime,
    set_target::SetTarget,
    submit::Submit,
    subscribe::{Subscribe, SubscribeResult},
    worker_name::WorkerName,
};
