use super::*;

/// Owns the job table and the share validation pipeline. Templates come in
/// from the daemon poller, jobs go out to connections over a broadcast
/// channel, shares come back in from connections.
pub struct JobManager {
    policy: CoinPolicy,
    pool_address: String,
    pool_sig: String,
    recipients: Vec<FeeRecipient>,
    daemon: Arc<dyn Daemon>,
    verifier: Arc<dyn EquihashVerifier>,
    state: Mutex<JobTable>,
    extranonce_counter: Mutex<ExtranonceCounter>,
    job_events: broadcast::Sender<JobEvent>,
    share_events: broadcast::Sender<ShareEvent>,
}

#[derive(Default)]
struct JobTable {
    current: Option<Arc<BlockTemplate>>,
    valid: HashMap<JobId, Arc<BlockTemplate>>,
    counter: JobCounter,
}

impl JobManager {
    pub fn new(
        policy: CoinPolicy,
        settings: &PoolSettings,
        daemon: Arc<dyn Daemon>,
        verifier: Arc<dyn EquihashVerifier>,
    ) -> Result<Self> {
        policy.validate(&settings.recipients)?;
        gen_tx::address_hash160(&settings.pool_address)
            .context("pool address is not a valid base58check address")?;
        for recipient in &settings.recipients {
            gen_tx::address_hash160(&recipient.address)
                .context("recipient address is not a valid base58check address")?;
        }

        let instance_id = settings.instance_id.unwrap_or_else(rand::random);

        Ok(Self {
            policy,
            pool_address: settings.pool_address.clone(),
            pool_sig: settings.pool_sig.clone(),
            recipients: settings.recipients.clone(),
            daemon,
            verifier,
            state: Mutex::new(JobTable::default()),
            extranonce_counter: Mutex::new(ExtranonceCounter::new(instance_id)),
            job_events: broadcast::channel(JOB_CHANNEL_CAPACITY).0,
            share_events: broadcast::channel(SHARE_CHANNEL_CAPACITY).0,
        })
    }

    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.job_events.subscribe()
    }

    pub fn subscribe_shares(&self) -> broadcast::Receiver<ShareEvent> {
        self.share_events.subscribe()
    }

    pub fn current_template(&self) -> Option<Arc<BlockTemplate>> {
        self.state.lock().current.clone()
    }

    pub fn next_extranonce(&self) -> Extranonce {
        self.extranonce_counter.lock().next()
    }

    /// Ingests a fresh template. Returns true when it started a new job
    /// generation, meaning miners were told to drop in-flight work.
    pub async fn process_template(&self, rpc_data: RpcBlockData) -> Result<bool> {
        {
            let state = self.state.lock();
            if let Some(current) = &state.current {
                let same_tip = current.rpc_data.previous_block_hash == rpc_data.previous_block_hash;
                // a lagging daemon must never roll the pool back
                if !same_tip && rpc_data.height < current.height() {
                    return Ok(false);
                }
                if same_tip {
                    return Ok(false);
                }
            }
        }

        let template = Arc::new(self.build_template(rpc_data).await?);

        let mut state = self.state.lock();
        state.valid.clear();
        state.valid.insert(template.job_id, template.clone());
        state.current = Some(template.clone());
        drop(state);

        self.job_events.send(JobEvent::New(template)).ok();

        Ok(true)
    }

    /// Replaces the current job with a refreshed template for the same tip,
    /// typically to pick up new transactions. Earlier jobs stay valid.
    pub async fn update_current_job(&self, rpc_data: RpcBlockData) -> Result {
        let template = Arc::new(self.build_template(rpc_data).await?);

        let mut state = self.state.lock();
        state.valid.insert(template.job_id, template.clone());
        state.current = Some(template.clone());
        drop(state);

        self.job_events.send(JobEvent::Refreshed(template)).ok();

        Ok(())
    }

    async fn build_template(&self, rpc_data: RpcBlockData) -> Result<BlockTemplate> {
        let job_id = JobId::from(self.state.lock().counter.next());

        let gen_tx = GenerationTxBuilder::new(&self.policy, &rpc_data, &self.pool_address)
            .with_pool_sig(&self.pool_sig)
            .with_recipients(&self.recipients)
            .build()?;

        let mut template = BlockTemplate::new(job_id, &self.policy, rpc_data, gen_tx)?;

        if self.policy.sidechain_aware {
            template.calculate_trees(self.daemon.as_ref()).await?;
        }

        Ok(template)
    }

    /// Validates one submitted share and emits a [`ShareEvent`] either way.
    pub fn process_share(
        &self,
        submission: &ShareSubmission,
    ) -> Result<ShareAccepted, StratumError> {
        let result = self.check_share(submission);

        let event = match &result {
            Ok(accepted) => ShareEvent {
                job_id: accepted.job_id,
                remote: submission.remote,
                port: submission.port,
                worker: submission.worker.clone(),
                difficulty: accepted.difficulty,
                height: Some(accepted.height),
                block_reward: Some(accepted.reward),
                share_diff: Some(accepted.share_diff),
                block_diff: Some(accepted.block_diff),
                block_diff_actual: Some(accepted.block_diff_actual),
                block_hash: accepted.block_hash.clone(),
                block_hex: accepted.block_hex.clone(),
                error: None,
            },
            Err(error) => ShareEvent {
                job_id: submission.job_id.parse().unwrap_or(JobId::from(0)),
                remote: submission.remote,
                port: submission.port,
                worker: submission.worker.clone(),
                difficulty: submission.difficulty,
                height: None,
                block_reward: None,
                share_diff: None,
                block_diff: None,
                block_diff_actual: None,
                block_hash: None,
                block_hex: None,
                error: Some(error.message.clone()),
            },
        };

        self.share_events.send(event).ok();

        result
    }

    fn check_share(&self, submission: &ShareSubmission) -> Result<ShareAccepted, StratumError> {
        let template = submission
            .job_id
            .parse::<JobId>()
            .ok()
            .and_then(|job_id| self.state.lock().valid.get(&job_id).cloned())
            .ok_or_else(StratumError::job_not_found)?;

        if submission.ntime.len() != 8 {
            return Err(StratumError::malformed("incorrect size of ntime"));
        }
        let ntime_bytes = <[u8; 4]>::from_hex(&submission.ntime)
            .map_err(|_| StratumError::malformed("invalid hex in ntime"))?;
        let ntime_value = u32::from_le_bytes(ntime_bytes);
        let now = unix_now();
        if u64::from(ntime_value) < u64::from(template.curtime())
            || u64::from(ntime_value) > now + MAX_NTIME_OFFSET
        {
            return Err(StratumError::malformed("ntime out of range"));
        }

        if submission.nonce.len() != 64 {
            return Err(StratumError::malformed("incorrect size of nonce"));
        }
        let nonce = submission
            .nonce
            .parse::<Nonce>()
            .map_err(|_| StratumError::malformed("invalid hex in nonce"))?;

        if submission.solution.len() != template.solution_hex_length() {
            return Err(StratumError::malformed("incorrect size of solution"));
        }
        let solution = hex::decode(&submission.solution)
            .map_err(|_| StratumError::malformed("invalid hex in solution"))?;

        hex::decode(&submission.extranonce2)
            .map_err(|_| StratumError::malformed("invalid hex in extranonce2"))?;

        let header = template.serialize_header(Ntime::from(ntime_value), &nonce);
        let header_hex = hex::encode(header);

        if !template.register_submit(&header_hex, &submission.solution) {
            return Err(StratumError::duplicate_share());
        }

        let (personalization, n, k) = template.equihash_params();
        let body = &solution[template.solution_prefix_hex() / 2..];
        if !self.verifier.verify(&header, body, personalization, n, k) {
            return Err(StratumError::malformed("invalid solution"));
        }

        let digest = template.header_digest(&header, &solution);
        let digest_value = U256::from_little_endian(&digest);
        let share_diff =
            u256_to_f64(&DIFF1) / u256_to_f64(&digest_value) * template.multiplier();

        let (block_hash, block_hex) = if digest_value <= template.target {
            let mut display = digest;
            display.reverse();
            let block = template.serialize_block(&header, &solution);
            (Some(hex::encode(display)), Some(hex::encode(block)))
        } else {
            (None, None)
        };

        let difficulty = match effective_difficulty(
            share_diff,
            submission.difficulty,
            submission.previous_difficulty,
        ) {
            Some(difficulty) => difficulty,
            // a block candidate is accepted no matter what the pool-side
            // difficulty says
            None if block_hash.is_some() => submission.difficulty,
            None => return Err(StratumError::low_difficulty(share_diff)),
        };

        Ok(ShareAccepted {
            job_id: template.job_id,
            height: template.height(),
            reward: template.reward,
            difficulty,
            share_diff,
            block_diff: template.difficulty * template.multiplier(),
            block_diff_actual: template.difficulty,
            block_hash,
            block_hex,
        })
    }
}

/// Raw submission as it came off the wire, plus session context.
#[derive(Debug, Clone)]
pub struct ShareSubmission {
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    /// extranonce1 and extranonce2 concatenated into the 32-byte nonce.
    pub nonce: String,
    pub solution: String,
    pub worker: WorkerName,
    pub remote: IpAddr,
    pub port: u16,
    pub difficulty: f64,
    pub previous_difficulty: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ShareAccepted {
    pub job_id: JobId,
    pub height: u64,
    pub reward: u64,
    /// Difficulty the share is credited at, which is the previous session
    /// difficulty when the share raced a retarget.
    pub difficulty: f64,
    pub share_diff: f64,
    /// Network difficulty scaled by the algorithm multiplier, comparable
    /// against `share_diff`.
    pub block_diff: f64,
    /// Network difficulty as the daemon reports it.
    pub block_diff_actual: f64,
    pub block_hash: Option<String>,
    pub block_hex: Option<String>,
}

impl ShareAccepted {
    pub fn is_block(&self) -> bool {
        self.block_hash.is_some()
    }
}

/// Shares just under the current difficulty are kept if they clear 99% of
/// it, or clear the difficulty the session was on a moment ago.
pub(crate) fn effective_difficulty(
    share_diff: f64,
    difficulty: f64,
    previous_difficulty: Option<f64>,
) -> Option<f64> {
    if share_diff / difficulty >= VARDIFF_GRACE {
        return Some(difficulty);
    }

    match previous_difficulty {
        Some(previous) if share_diff >= previous => Some(previous),
        _ => None,
    }
}

/// Remembers the last block pushed upstream so a winning share that arrives
/// twice is only submitted to the daemon once.
#[derive(Default)]
pub struct SubmitGate {
    last: Mutex<Option<String>>,
}

impl SubmitGate {
    pub fn permit(&self, block_hex: &str) -> bool {
        let mut last = self.last.lock();
        if last.as_deref() == Some(block_hex) {
            return false;
        }
        *last = Some(block_hex.to_string());
        true
    }
}

/// Job ids start away from zero so they are never confused with request
/// ids, and wrap long before they could collide with a live job.
struct JobCounter {
    counter: u64,
}

impl Default for JobCounter {
    fn default() -> Self {
        Self { counter: 0xcccc }
    }
}

impl JobCounter {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        if self.counter % 0xff_ffff_ffff == 0 {
            self.counter = 1;
        }
        self.counter
    }
}

/// Hands out four-byte extranonce1 values. Seeding the top bits with the
/// instance id keeps parallel pool processes out of each other's search
/// space.
pub(crate) struct ExtranonceCounter {
    counter: u32,
}

impl ExtranonceCounter {
    fn new(instance_id: u32) -> Self {
        Self {
            counter: instance_id.wrapping_shl(27),
        }
    }

    fn next(&mut self) -> Extranonce {
        self.counter = self.counter.wrapping_add(1);
        Extranonce::from_bytes(self.counter.to_be_bytes().to_vec())
    }
}
