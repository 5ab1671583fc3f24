use super::*;

/// `getblocktemplate` reply, trimmed to the fields the pool consumes.
/// Coins bolt their reward metadata onto the same object, so subsidy
/// fields are flattened in rather than modeled per coin.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlockData {
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    #[serde(default)]
    pub target: String,
    pub bits: String,
    pub curtime: u32,
    pub height: u64,
    pub version: u32,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
    #[serde(default)]
    pub certificates: Vec<RpcCertificate>,
    #[serde(rename = "finalsaplingroothash", default)]
    pub final_sapling_root_hash: Option<String>,
    #[serde(default)]
    pub default_witness_commitment: Option<String>,
    #[serde(flatten)]
    pub subsidy: Subsidy,
}

impl RpcBlockData {
    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.fee).sum::<u64>()
            + self.certificates.iter().map(|cert| cert.fee).sum::<u64>()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub data: String,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCertificate {
    pub data: String,
    #[serde(default)]
    pub fee: u64,
}

/// Reward split reported by the daemon. `miner` is in coins, everything
/// else already in zatoshis except where noted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subsidy {
    #[serde(default)]
    pub miner: f64,
    #[serde(default)]
    pub founders: Option<f64>,
    #[serde(default)]
    pub infrastructure: Option<f64>,
    #[serde(default)]
    pub giveaways: Option<f64>,
    #[serde(default)]
    pub premine: Option<u64>,
    #[serde(default)]
    pub fundingstreams: Vec<FundingStream>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub payee_amount: Option<u64>,
    #[serde(default)]
    pub zelnodes: Option<ZelnodeTiers>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingStream {
    pub address: String,
    #[serde(rename = "valueZat")]
    pub value_zat: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZelnodeTiers {
    #[serde(default)]
    pub basic: Option<ZelnodePayee>,
    #[serde(rename = "super", default)]
    pub super_: Option<ZelnodePayee>,
    #[serde(default)]
    pub bamf: Option<ZelnodePayee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZelnodePayee {
    pub payee: String,
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_template() {
        let data: RpcBlockData = serde_json::from_str(
            r#"{
                "previousblockhash": "00000000019cb4e8a603c4deaa6171c2a502aa678c3dfef2356faa7d9e5e1b9e",
                "bits": "1f07ffff",
                "curtime": 1600000000,
                "height": 1,
                "version": 4,
                "miner": 6.25
            }"#,
        )
        .unwrap();

        assert_eq!(data.height, 1);
        assert_eq!(data.curtime, 1_600_000_000);
        assert!(data.target.is_empty());
        assert!(data.transactions.is_empty());
        assert!(data.certificates.is_empty());
        assert_eq!(data.subsidy.miner, 6.25);
        assert_eq!(data.total_fees(), 0);
    }

    #[test]
    fn fees_sum_transactions_and_certificates() {
        let data: RpcBlockData = serde_json::from_str(
            r#"{
                "previousblockhash": "00",
                "bits": "1f07ffff",
                "curtime": 1600000000,
                "height": 10,
                "version": 4,
                "miner": 6.25,
                "transactions": [
                    {"data": "aa", "fee": 600},
                    {"data": "bb", "fee": 400, "hash": "cc"}
                ],
                "certificates": [
                    {"data": "dd", "fee": 250}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(data.total_fees(), 1250);
        assert_eq!(data.transactions[1].hash.as_deref(), Some("cc"));
    }

    #[test]
    fn subsidy_extensions_flatten_in() {
        let data: RpcBlockData = serde_json::from_str(
            r#"{
                "previousblockhash": "00",
                "bits": "1f07ffff",
                "curtime": 1600000000,
                "height": 1046400,
                "version": 4,
                "miner": 2.5,
                "fundingstreams": [
                    {"address": "t3a", "valueZat": 21875000},
                    {"address": "t3b", "valueZat": 17500000}
                ],
                "payee": "RMasternodePayee",
                "payee_amount": 45000000,
                "zelnodes": {
                    "basic": {"payee": "t1basic", "amount": 281250000},
                    "super": {"payee": "t1super", "amount": 468750000}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(data.subsidy.fundingstreams.len(), 2);
        assert_eq!(data.subsidy.fundingstreams[0].value_zat, 21_875_000);
        assert_eq!(data.subsidy.payee.as_deref(), Some("RMasternodePayee"));
        let zelnodes = data.subsidy.zelnodes.unwrap();
        assert_eq!(zelnodes.basic.unwrap().amount, 281_250_000);
        assert_eq!(zelnodes.super_.unwrap().payee, "t1super");
        assert!(zelnodes.bamf.is_none());
    }
}
