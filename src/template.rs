use super::*;

/// One unit of work derived from a `getblocktemplate` reply. Everything a
/// share needs to be validated and serialized into a block candidate.
#[derive(Debug)]
pub struct BlockTemplate {
    pub job_id: JobId,
    pub rpc_data: RpcBlockData,
    pub target: U256,
    pub difficulty: f64,
    pub reward: u64,
    pub gen_tx: GenerationTx,
    prev_hash: [u8; 32],
    merkle_root: [u8; 32],
    reserved: [u8; 32],
    bits: [u8; 4],
    solution_hex_length: usize,
    solution_prefix_hex: usize,
    personalization: String,
    n: u32,
    k: u32,
    multiplier: f64,
    digest: HeaderDigest,
    include_certificates: bool,
    transactions: Vec<Vec<u8>>,
    certificates: Vec<Vec<u8>>,
    submits: Mutex<HashSet<String>>,
    notify: OnceLock<Notify>,
}

impl BlockTemplate {
    pub fn new(
        job_id: JobId,
        policy: &CoinPolicy,
        rpc_data: RpcBlockData,
        gen_tx: GenerationTx,
    ) -> Result<Self> {
        let target = if rpc_data.target.is_empty() {
            target_from_bits(u32::from_str_radix(&rpc_data.bits, 16)?)
        } else {
            U256::from_big_endian(&<[u8; 32]>::from_hex(&rpc_data.target)?)
        };

        ensure!(!target.is_zero(), "template target is zero");

        let difficulty = round_to(u256_to_f64(&DIFF1) / u256_to_f64(&target), 9);

        let transactions = rpc_data
            .transactions
            .iter()
            .map(|tx| Ok(hex::decode(&tx.data)?))
            .collect::<Result<Vec<Vec<u8>>>>()?;

        let certificates = rpc_data
            .certificates
            .iter()
            .map(|cert| Ok(hex::decode(&cert.data)?))
            .collect::<Result<Vec<Vec<u8>>>>()?;

        ensure!(
            1 + transactions.len() + certificates.len() <= 0x7fff,
            "template carries too many transactions"
        );

        let mut leaves = Vec::with_capacity(1 + transactions.len());
        leaves.push(gen_tx.txid());
        for (tx, raw) in rpc_data.transactions.iter().zip(&transactions) {
            leaves.push(match &tx.hash {
                Some(hash) => reversed_hash(hash)?,
                None => sha256d::Hash::hash(raw).to_byte_array(),
            });
        }

        let reserved = match &rpc_data.final_sapling_root_hash {
            Some(hash) => reversed_hash(hash)?,
            None => [0; 32],
        };

        let mut bits = <[u8; 4]>::from_hex(&rpc_data.bits)?;
        bits.reverse();

        Ok(Self {
            job_id,
            target,
            difficulty,
            reward: gen_tx::block_reward(policy, &rpc_data.subsidy),
            prev_hash: reversed_hash(&rpc_data.previous_block_hash)?,
            merkle_root: merkle::merkle_root(&leaves),
            reserved,
            bits,
            solution_hex_length: policy.pow.solution_hex_length()?,
            solution_prefix_hex: policy.pow.solution_prefix_hex(),
            personalization: policy.pow.personalization.clone(),
            n: policy.pow.n,
            k: policy.pow.k,
            multiplier: policy.pow.multiplier,
            digest: policy.pow.header_digest,
            include_certificates: policy.sidechain_aware,
            transactions,
            certificates,
            gen_tx,
            rpc_data,
            submits: Mutex::new(HashSet::new()),
            notify: OnceLock::new(),
        })
    }

    /// Sidechain-aware chains commit to certificates outside the plain
    /// transaction tree, so both roots come from the daemon instead.
    pub async fn calculate_trees(&mut self, daemon: &dyn Daemon) -> Result {
        let mut transactions = Vec::with_capacity(1 + self.transactions.len());
        transactions.push(hex::encode(self.gen_tx.bytes()));
        transactions.extend(self.transactions.iter().map(hex::encode));

        let certificates: Vec<String> = self.certificates.iter().map(hex::encode).collect();

        let replies = daemon
            .cmd("getblockmerkleroots", json!([transactions, certificates]))
            .await?;

        let roots: MerkleRoots = replies
            .first()
            .context("no reply to getblockmerkleroots")?
            .result()?;

        self.merkle_root = reversed_hash(&roots.merkle_tree)?;
        self.reserved = reversed_hash(&roots.sc_txs_commitment)?;

        Ok(())
    }

    pub fn height(&self) -> u64 {
        self.rpc_data.height
    }

    pub fn curtime(&self) -> u32 {
        self.rpc_data.curtime
    }

    pub fn solution_hex_length(&self) -> usize {
        self.solution_hex_length
    }

    pub fn solution_prefix_hex(&self) -> usize {
        self.solution_prefix_hex
    }

    pub fn equihash_params(&self) -> (&str, u32, u32) {
        (&self.personalization, self.n, self.k)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// 140-byte block header in wire order.
    pub fn serialize_header(&self, ntime: Ntime, nonce: &Nonce) -> [u8; 140] {
        let mut header = [0u8; 140];
        header[0..4].copy_from_slice(&self.rpc_data.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        header[68..100].copy_from_slice(&self.reserved);
        header[100..104].copy_from_slice(&ntime.wire_bytes());
        header[104..108].copy_from_slice(&self.bits);
        header[108..140].copy_from_slice(nonce.as_bytes());
        header
    }

    pub fn header_digest(&self, header: &[u8; 140], solution: &[u8]) -> [u8; 32] {
        let mut data = Vec::with_capacity(140 + solution.len());
        data.extend_from_slice(header);
        data.extend_from_slice(solution);
        self.digest.digest(&data)
    }

    /// Full block submission: header, solution, then the transaction list
    /// with the generation transaction first.
    pub fn serialize_block(&self, header: &[u8; 140], solution: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(
            140 + solution.len()
                + self.gen_tx.bytes().len()
                + self.transactions.iter().map(Vec::len).sum::<usize>()
                + self.certificates.iter().map(Vec::len).sum::<usize>()
                + 8,
        );

        block.extend_from_slice(header);
        block.extend_from_slice(solution);

        write_narrow_varint(&mut block, (1 + self.transactions.len()) as u16);
        block.extend_from_slice(self.gen_tx.bytes());
        for tx in &self.transactions {
            block.extend_from_slice(tx);
        }

        if self.include_certificates {
            write_narrow_varint(&mut block, self.certificates.len() as u16);
            for cert in &self.certificates {
                block.extend_from_slice(cert);
            }
        }

        block
    }

    /// Records a submission, returning false if the same header and
    /// solution were already seen for this template.
    pub fn register_submit(&self, header_hex: &str, solution_hex: &str) -> bool {
        let mut submit = String::with_capacity(header_hex.len() + solution_hex.len());
        submit.push_str(&header_hex.to_lowercase());
        submit.push_str(&solution_hex.to_lowercase());
        self.submits.lock().insert(submit)
    }

    pub fn job_params(&self, clean_jobs: bool) -> Notify {
        let mut notify = self
            .notify
            .get_or_init(|| Notify {
                job_id: self.job_id.to_string(),
                version: hex::encode(self.rpc_data.version.to_le_bytes()),
                prev_hash: hex::encode(self.prev_hash),
                merkle_root: hex::encode(self.merkle_root),
                reserved: hex::encode(self.reserved),
                ntime: Ntime::from(self.rpc_data.curtime),
                bits: hex::encode(self.bits),
                clean_jobs: true,
            })
            .clone();
        notify.clean_jobs = clean_jobs;
        notify
    }
}

#[derive(Debug, Deserialize)]
struct MerkleRoots {
    #[serde(rename = "merkleTree")]
    merkle_tree: String,
    #[serde(rename = "scTxsCommitment")]
    sc_txs_commitment: String,
}

/// Expands compact nBits into a full target.
pub(crate) fn target_from_bits(bits: u32) -> U256 {
    let exponent = bits >> 24;
    let mantissa = U256::from(bits & 0x007f_ffff);

    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    }
}

/// Decodes display-order hex into internal byte order.
pub(crate) fn reversed_hash(hash: &str) -> Result<[u8; 32]> {
    let mut bytes = <[u8; 32]>::from_hex(hash)?;
    bytes.reverse();
    Ok(bytes)
}

/// Block transaction counts narrow to two bytes; anything wider was
/// rejected at template construction.
fn write_narrow_varint(buffer: &mut Vec<u8>, value: u16) {
    if value <= 0xfc {
        buffer.push(value as u8);
    } else {
        buffer.push(0xfd);
        buffer.extend_from_slice(&value.to_le_bytes());
    }
}
