use super::*;

const OVERWINTER_VERSION: u32 = 0x8000_0003;
const OVERWINTER_GROUP_ID: u32 = 0x03C4_8270;
const SAPLING_VERSION: u32 = 0x8000_0004;
const SAPLING_GROUP_ID: u32 = 0x892F_2085;
const MAX_SCRIPT_SIG: usize = 100;

/// Fully serialized generation (coinbase) transaction.
#[derive(Debug, Clone)]
pub struct GenerationTx {
    bytes: Vec<u8>,
    txid: [u8; 32],
}

impl GenerationTx {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Internal byte order, the order merkle trees hash in.
    pub fn txid(&self) -> [u8; 32] {
        self.txid
    }

    /// RPC display order.
    pub fn txid_hex(&self) -> String {
        let mut reversed = self.txid;
        reversed.reverse();
        hex::encode(reversed)
    }
}

pub struct GenerationTxBuilder<'a> {
    policy: &'a CoinPolicy,
    rpc: &'a RpcBlockData,
    pool_address: &'a str,
    pool_sig: &'a str,
    recipients: &'a [FeeRecipient],
}

impl<'a> GenerationTxBuilder<'a> {
    pub fn new(policy: &'a CoinPolicy, rpc: &'a RpcBlockData, pool_address: &'a str) -> Self {
        Self {
            policy,
            rpc,
            pool_address,
            pool_sig: "",
            recipients: &[],
        }
    }

    pub fn with_pool_sig(mut self, pool_sig: &'a str) -> Self {
        self.pool_sig = pool_sig;
        self
    }

    pub fn with_recipients(mut self, recipients: &'a [FeeRecipient]) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn build(self) -> Result<GenerationTx> {
        let format = self.policy.tx_version.select(self.rpc.height);

        let mut tx = Vec::with_capacity(256);

        match format {
            TxFormat::Legacy => tx.write_u32::<LittleEndian>(1)?,
            TxFormat::Overwinter => {
                tx.write_u32::<LittleEndian>(OVERWINTER_VERSION)?;
                tx.write_u32::<LittleEndian>(OVERWINTER_GROUP_ID)?;
            }
            TxFormat::Sapling => {
                tx.write_u32::<LittleEndian>(SAPLING_VERSION)?;
                tx.write_u32::<LittleEndian>(SAPLING_GROUP_ID)?;
            }
        }

        self.write_input(&mut tx)?;
        self.write_outputs(&mut tx)?;

        // lock time
        tx.write_u32::<LittleEndian>(0)?;

        match format {
            TxFormat::Legacy => {}
            TxFormat::Overwinter => {
                // expiry height, then empty joinsplit vector
                tx.write_u32::<LittleEndian>(0)?;
                tx.push(0);
            }
            TxFormat::Sapling => {
                // expiry height, value balance, then empty shielded
                // spend, shielded output and joinsplit vectors
                tx.write_u32::<LittleEndian>(0)?;
                tx.extend_from_slice(&[0u8; 8]);
                tx.extend_from_slice(&[0, 0, 0]);
            }
        }

        let txid = sha256d::Hash::hash(&tx).to_byte_array();

        Ok(GenerationTx { bytes: tx, txid })
    }

    fn write_input(&self, tx: &mut Vec<u8>) -> Result {
        // single input spending the null outpoint
        tx.extend_from_slice(&[1u8]);
        tx.extend_from_slice(&[0u8; 32]);
        tx.write_u32::<LittleEndian>(u32::MAX)?;

        let height = script_number(self.rpc.height);

        let mut script_sig = Vec::with_capacity(height.len() + self.pool_sig.len() + 2);
        script_sig.push(
            u8::try_from(height.len()).context("serialized height exceeds one push byte")?,
        );
        script_sig.extend_from_slice(&height);
        script_sig.extend_from_slice(self.pool_sig.as_bytes());
        script_sig.push(0);

        ensure!(
            script_sig.len() <= MAX_SCRIPT_SIG,
            "coinbase script sig is {} bytes, maximum is {MAX_SCRIPT_SIG}",
            script_sig.len()
        );

        write_varint(tx, script_sig.len() as u64);
        tx.extend_from_slice(&script_sig);
        tx.write_u32::<LittleEndian>(u32::MAX)?;

        Ok(())
    }

    fn write_outputs(&self, tx: &mut Vec<u8>) -> Result {
        let subsidy = &self.rpc.subsidy;
        let total = block_reward(self.policy, subsidy);
        let fees = self.rpc.total_fees();

        let mut aux = self.reward_outputs(total)?;

        for stream in &subsidy.fundingstreams {
            aux.push((stream.value_zat, p2sh_script(address_hash160(&stream.address)?)));
        }

        let mut recipients = Vec::with_capacity(self.recipients.len());
        for recipient in self.recipients {
            recipients.push((
                round_pct(total, recipient.percent),
                p2pkh_script(address_hash160(&recipient.address)?),
            ));
        }

        // the operator takes whatever the fixed outputs leave behind, so
        // the sum always lands exactly on total plus fees
        let fixed: u64 = aux.iter().chain(&recipients).map(|(value, _)| value).sum();
        let operator = (total + fees)
            .checked_sub(fixed)
            .context("reward outputs exceed the block subsidy")?;

        if self.policy.burn_fees && fees > 0 {
            let (first, _) = recipients
                .first_mut()
                .context("burning fees requires at least one recipient")?;
            *first = first
                .checked_sub(fees)
                .context("recipient share is smaller than the fees to burn")?;
        }

        let mut outputs = Vec::with_capacity(aux.len() + recipients.len() + 2);
        outputs.push((operator, p2pkh_script(address_hash160(self.pool_address)?)));
        outputs.extend(aux);

        if let Some(commitment) = &self.rpc.default_witness_commitment {
            outputs.push((0, hex::decode(commitment)?));
        }

        outputs.extend(recipients);

        write_varint(tx, outputs.len() as u64);
        for (value, script) in outputs {
            tx.write_u64::<LittleEndian>(value)?;
            write_varint(tx, script.len() as u64);
            tx.extend_from_slice(&script);
        }

        Ok(())
    }

    /// Plan-specific outputs that come out of the miner's share.
    fn reward_outputs(&self, total: u64) -> Result<Vec<(u64, Vec<u8>)>> {
        let subsidy = &self.rpc.subsidy;
        let height = self.rpc.height;
        let mut outputs = Vec::new();

        match &self.policy.reward {
            RewardPlan::Plain | RewardPlan::FundingStreams => {}
            RewardPlan::Founders(plan) => {
                if let Some(update) = plan
                    .treasury_update
                    .as_ref()
                    .filter(|update| height >= update.start_height)
                {
                    for tier in [&update.treasury, &update.securenodes, &update.supernodes] {
                        let index = ((height - update.start_height) / update.change_interval)
                            as usize
                            % tier.addresses.len();
                        outputs.push((
                            round_pct(total, tier.percent),
                            p2sh_script(address_hash160(&tier.addresses[index])?),
                        ));
                    }
                } else if let Some(treasury) = plan
                    .treasury
                    .as_ref()
                    .filter(|treasury| height >= treasury.start_height)
                {
                    let index = ((height - treasury.start_height) / treasury.change_interval)
                        as usize
                        % treasury.addresses.len();
                    outputs.push((
                        round_pct(total, treasury.percent),
                        p2sh_script(address_hash160(&treasury.addresses[index])?),
                    ));
                } else if height < plan.max_height {
                    let index =
                        ((height / plan.change_interval) as usize).min(plan.addresses.len() - 1);
                    outputs.push((
                        round_pct(total, plan.percent),
                        p2sh_script(address_hash160(&plan.addresses[index])?),
                    ));
                }

                if let (Some(premine), Some(address)) = (subsidy.premine, &plan.premine_address) {
                    outputs.push((premine, p2sh_script(address_hash160(address)?)));
                }
            }
            RewardPlan::PayAllFounders(plan) => {
                let founders = round_coins(
                    subsidy
                        .founders
                        .context("founders subsidy missing from template")?,
                    self.policy,
                );
                let infrastructure = round_coins(
                    subsidy
                        .infrastructure
                        .context("infrastructure subsidy missing from template")?,
                    self.policy,
                );
                let giveaways = round_coins(
                    subsidy
                        .giveaways
                        .context("giveaways subsidy missing from template")?,
                    self.policy,
                );

                let share = founders / plan.founders_addresses.len() as u64;
                for address in &plan.founders_addresses {
                    outputs.push((share, p2sh_script(address_hash160(address)?)));
                }
                outputs.push((
                    infrastructure,
                    p2sh_script(address_hash160(&plan.infrastructure_address)?),
                ));
                outputs.push((
                    giveaways,
                    p2sh_script(address_hash160(&plan.giveaways_address)?),
                ));
            }
            RewardPlan::Masternode => {
                let payee = subsidy
                    .payee
                    .as_ref()
                    .context("masternode payee missing from template")?;
                let amount = subsidy
                    .payee_amount
                    .context("masternode payee amount missing from template")?;
                outputs.push((amount, p2pkh_script(address_hash160(payee)?)));
            }
            RewardPlan::Zelnode => {
                let tiers = subsidy
                    .zelnodes
                    .as_ref()
                    .context("zelnode payees missing from template")?;
                for payee in [&tiers.basic, &tiers.super_, &tiers.bamf]
                    .into_iter()
                    .flatten()
                {
                    outputs.push((payee.amount, p2pkh_script(address_hash160(&payee.payee)?)));
                }
            }
        }

        Ok(outputs)
    }
}

/// Total minted value of the block, fees excluded.
pub(crate) fn block_reward(policy: &CoinPolicy, subsidy: &Subsidy) -> u64 {
    let mut total = round_coins(subsidy.miner, policy);

    total += subsidy.premine.unwrap_or_default();
    total += subsidy
        .fundingstreams
        .iter()
        .map(|stream| stream.value_zat)
        .sum::<u64>();

    if matches!(policy.reward, RewardPlan::PayAllFounders(_)) {
        total += round_coins(subsidy.founders.unwrap_or_default(), policy);
        total += round_coins(subsidy.infrastructure.unwrap_or_default(), policy);
        total += round_coins(subsidy.giveaways.unwrap_or_default(), policy);
    }

    total
}

fn round_coins(coins: f64, policy: &CoinPolicy) -> u64 {
    (coins * policy.subsidy_multiple).round() as u64
}

fn round_pct(total: u64, percent: f64) -> u64 {
    (total as f64 * percent / 100.0).round() as u64
}

pub(crate) fn address_hash160(address: &str) -> Result<[u8; 20]> {
    let payload = base58::decode_check(address)
        .with_context(|| format!("invalid base58 address `{address}`"))?;

    ensure!(
        payload.len() > 20,
        "address `{address}` payload is too short"
    );

    let mut output = [0u8; 20];
    output.copy_from_slice(&payload[payload.len() - 20..]);
    Ok(output)
}

pub(crate) fn p2pkh_script(hash: [u8; 20]) -> Vec<u8> {
    Builder::new()
        .push_opcode(opcodes::all::OP_DUP)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(hash)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .into_script()
        .into_bytes()
}

pub(crate) fn p2sh_script(hash: [u8; 20]) -> Vec<u8> {
    Builder::new()
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(hash)
        .push_opcode(opcodes::all::OP_EQUAL)
        .into_script()
        .into_bytes()
}

/// Minimal little-endian script integer, sign-bit padded, as consensus
/// expects for the BIP34 height push.
pub(crate) fn script_number(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }

    let mut bytes = Vec::new();
    let mut remaining = value;
    while remaining > 0 {
        bytes.push((remaining & 0xff) as u8);
        remaining >>= 8;
    }

    if bytes.last().is_some_and(|byte| byte & 0x80 != 0) {
        bytes.push(0);
    }

    bytes
}

pub(crate) fn write_varint(buffer: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buffer.push(value as u8),
        0xfd..=0xffff => {
            buffer.push(0xfd);
            buffer.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buffer.push(0xfe);
            buffer.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buffer.push(0xff);
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }
}
