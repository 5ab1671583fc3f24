use super::*;

/// Immutable chain rules for one Equihash coin. Everything share validation
/// and reward assembly needs to know that is not in the daemon's template.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinPolicy {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub reward: RewardPlan,
    #[serde(default)]
    pub pow: PowParams,
    #[serde(default)]
    pub tx_version: TxVersionRule,
    #[serde(default)]
    pub sidechain_aware: bool,
    #[serde(default)]
    pub burn_fees: bool,
    #[serde(default = "default_subsidy_multiple")]
    pub subsidy_multiple: f64,
}

fn default_subsidy_multiple() -> f64 {
    COIN_VALUE as f64
}

impl CoinPolicy {
    pub fn validate(&self, recipients: &[FeeRecipient]) -> Result {
        self.pow.solution_hex_length()?;
        self.reward.validate()?;

        let percent: f64 =
            recipients.iter().map(|r| r.percent).sum::<f64>() + self.reward.max_percent();

        ensure!(
            percent <= 100.0,
            "total reward percentage {percent} exceeds 100"
        );

        Ok(())
    }
}

/// Which generation-transaction branch a coin follows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RewardPlan {
    #[default]
    Plain,
    Founders(FoundersPlan),
    FundingStreams,
    PayAllFounders(PayAllFoundersPlan),
    Masternode,
    Zelnode,
}

impl RewardPlan {
    fn max_percent(&self) -> f64 {
        match self {
            RewardPlan::Founders(plan) => plan.max_percent(),
            _ => 0.0,
        }
    }

    /// Address rotation divides by interval and indexes into the address
    /// list, so empty lists and zero intervals must be refused up front.
    fn validate(&self) -> Result {
        match self {
            RewardPlan::Founders(plan) => plan.validate(),
            RewardPlan::PayAllFounders(plan) => {
                ensure!(
                    !plan.founders_addresses.is_empty(),
                    "pay-all-founders plan requires at least one founder address"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FoundersPlan {
    pub percent: f64,
    pub addresses: Vec<String>,
    pub change_interval: u64,
    pub max_height: u64,
    #[serde(default)]
    pub treasury: Option<TreasuryTier>,
    #[serde(default)]
    pub treasury_update: Option<TreasuryUpdate>,
    #[serde(default)]
    pub premine_address: Option<String>,
}

impl FoundersPlan {
    fn validate(&self) -> Result {
        ensure!(
            !self.addresses.is_empty(),
            "founders plan requires at least one address"
        );
        ensure!(
            self.change_interval > 0,
            "founders change_interval must be nonzero"
        );

        if let Some(treasury) = &self.treasury {
            ensure!(
                !treasury.addresses.is_empty(),
                "treasury tier requires at least one address"
            );
            ensure!(
                treasury.change_interval > 0,
                "treasury change_interval must be nonzero"
            );
        }

        if let Some(update) = &self.treasury_update {
            ensure!(
                update.change_interval > 0,
                "treasury update change_interval must be nonzero"
            );
            for tier in [&update.treasury, &update.securenodes, &update.supernodes] {
                ensure!(
                    !tier.addresses.is_empty(),
                    "treasury update tiers require at least one address"
                );
            }
        }

        Ok(())
    }

    fn max_percent(&self) -> f64 {
        let mut percent: f64 = self.percent;
        if let Some(treasury) = &self.treasury {
            percent = percent.max(treasury.percent);
        }
        if let Some(update) = &self.treasury_update {
            percent = percent.max(
                update.treasury.percent + update.securenodes.percent + update.supernodes.percent,
            );
        }
        percent
    }
}

/// Single rotating treasury tier that replaces the founders reward at a
/// given height.
#[derive(Debug, Clone, Deserialize)]
pub struct TreasuryTier {
    pub start_height: u64,
    pub change_interval: u64,
    pub percent: f64,
    pub addresses: Vec<String>,
}

/// Later hard-fork schedule that splits the treasury into treasury,
/// securenodes and supernodes slices, all rotating on one interval.
#[derive(Debug, Clone, Deserialize)]
pub struct TreasuryUpdate {
    pub start_height: u64,
    pub change_interval: u64,
    pub treasury: TierShare,
    pub securenodes: TierShare,
    pub supernodes: TierShare,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierShare {
    pub percent: f64,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayAllFoundersPlan {
    pub founders_addresses: Vec<String>,
    pub infrastructure_address: String,
    pub giveaways_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowParams {
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default = "default_personalization")]
    pub personalization: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub header_digest: HeaderDigest,
}

fn default_n() -> u32 {
    200
}

fn default_k() -> u32 {
    9
}

fn default_personalization() -> String {
    "ZcashPoW".into()
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for PowParams {
    fn default() -> Self {
        Self {
            n: default_n(),
            k: default_k(),
            personalization: default_personalization(),
            multiplier: default_multiplier(),
            header_digest: HeaderDigest::default(),
        }
    }
}

impl PowParams {
    /// Hex length of a wire solution, length-prefix included.
    pub fn solution_hex_length(&self) -> Result<usize> {
        match (self.n, self.k) {
            (200, 9) => Ok(2694),
            (192, 7) => Ok(806),
            (144, 5) => Ok(202),
            (n, k) => bail!("unsupported equihash parameters ({n}, {k})"),
        }
    }

    /// Hex characters of varint length prefix to strip before verification.
    pub fn solution_prefix_hex(&self) -> usize {
        match (self.n, self.k) {
            (144, 5) => 2,
            _ => 6,
        }
    }
}

/// Overwinter/sapling activation, either a hard boolean or a height.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Activation {
    Enabled(bool),
    Height(u64),
}

impl Activation {
    pub fn active(self, height: u64) -> bool {
        match self {
            Activation::Enabled(enabled) => enabled,
            Activation::Height(activation) => height >= activation,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TxVersionRule {
    #[serde(default)]
    pub overwinter: Option<Activation>,
    #[serde(default)]
    pub sapling: Option<Activation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFormat {
    Legacy,
    Overwinter,
    Sapling,
}

impl TxVersionRule {
    /// Sapling wins over overwinter when both are active at a height.
    pub fn select(&self, height: u64) -> TxFormat {
        if self.sapling.is_some_and(|a| a.active(height)) {
            TxFormat::Sapling
        } else if self.overwinter.is_some_and(|a| a.active(height)) {
            TxFormat::Overwinter
        } else {
            TxFormat::Legacy
        }
    }
}

/// Pool fee destination, paid a percentage of the block reward.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeRecipient {
    pub address: String,
    pub percent: f64,
}
