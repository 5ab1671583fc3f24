use super::*;

/// One miner session over a framed line protocol.
pub(crate) struct Connection<R, W> {
    settings: Arc<PoolSettings>,
    job_manager: Arc<JobManager>,
    authorizer: Arc<dyn Authorizer>,
    bans: Arc<BanTable>,
    events: broadcast::Sender<ServerEvent>,
    port: PortSettings,
    remote: IpAddr,
    session_id: String,
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
    jobs: Option<broadcast::Receiver<JobEvent>>,
    commands: Option<mpsc::UnboundedReceiver<ConnectionCommand>>,
    command_sender: mpsc::UnboundedSender<ConnectionCommand>,
    extranonce1: Option<Extranonce>,
    worker: Option<WorkerName>,
    authorized: bool,
    difficulty: f64,
    previous_difficulty: Option<f64>,
    pending_difficulty: Option<f64>,
    last_activity: Instant,
    shares: ShareCounter,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        settings: Arc<PoolSettings>,
        job_manager: Arc<JobManager>,
        authorizer: Arc<dyn Authorizer>,
        bans: Arc<BanTable>,
        events: broadcast::Sender<ServerEvent>,
        port: PortSettings,
        remote: IpAddr,
        session_id: String,
        reader: R,
        writer: W,
    ) -> Self {
        let (command_sender, commands) = mpsc::unbounded_channel();
        let jobs = job_manager.subscribe_jobs();
        let difficulty = port.difficulty;

        Self {
            settings,
            job_manager,
            authorizer,
            bans,
            events,
            port,
            remote,
            session_id,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            jobs: Some(jobs),
            commands: Some(commands),
            command_sender,
            extranonce1: None,
            worker: None,
            authorized: false,
            difficulty,
            previous_difficulty: None,
            pending_difficulty: None,
            last_activity: Instant::now(),
            shares: ShareCounter::default(),
        }
    }

    /// Handle the embedder can use to retarget this session.
    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<ConnectionCommand> {
        self.command_sender.clone()
    }

    pub(crate) async fn serve(mut self) -> Result {
        if self.port.proxy_protocol {
            self.read_proxy_preamble().await?;
        }

        ensure!(
            self.bans.allowed(self.remote),
            "refusing banned client {}",
            self.remote
        );

        let mut jobs = self.jobs.take().context("connection already served")?;
        let mut commands = self.commands.take().context("connection already served")?;
        let mut commands_closed = false;

        loop {
            tokio::select! {
                message = self.read_message() => {
                    let Some(message) = message? else {
                        debug!(remote = %self.remote, "client disconnected");
                        break;
                    };

                    self.last_activity = Instant::now();

                    let Message::Request { id, method, params } = message else {
                        warn!(?message, "ignoring non-request from miner");
                        continue;
                    };

                    match method.as_str() {
                        "mining.subscribe" => {
                            let subscribe = serde_json::from_value::<Subscribe>(params)
                                .unwrap_or_default();
                            self.subscribe(id, subscribe).await?;
                        }
                        "mining.authorize" => {
                            let Ok(authorize) = serde_json::from_value::<Authorize>(params) else {
                                self.send_error(id, StratumError::malformed("malformed authorize"))
                                    .await?;
                                continue;
                            };
                            self.authorize(id, authorize).await?;
                        }
                        "mining.submit" => {
                            let Ok(submit) = serde_json::from_value::<Submit>(params) else {
                                self.shares.record(false);
                                self.send_error(id, StratumError::malformed("malformed submit"))
                                    .await?;
                                self.enforce_ban_policy().await?;
                                continue;
                            };
                            self.submit(id, submit).await?;
                        }
                        "mining.get_transactions" => {
                            self.send(Message::Response {
                                id,
                                result: Some(json!([])),
                                error: Some(StratumError::malformed("not supported").to_wire()),
                            })
                            .await?;
                        }
                        "mining.extranonce.subscribe" => {
                            self.send(Message::Response {
                                id,
                                result: Some(json!(false)),
                                error: Some(StratumError::malformed("not supported").to_wire()),
                            })
                            .await?;
                        }
                        method => {
                            warn!(remote = %self.remote, "unknown method {method}");
                        }
                    }
                }

                job = jobs.recv() => {
                    match job {
                        Ok(event) => self.push_job(event).await?,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(remote = %self.remote, "session lagged {skipped} jobs behind");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                command = commands.recv(), if !commands_closed => {
                    match command {
                        Some(ConnectionCommand::SetDifficulty(difficulty)) => {
                            self.pending_difficulty = Some(difficulty);
                        }
                        None => commands_closed = true,
                    }
                }
            }
        }

        Ok(())
    }

    /// PROXY protocol v1: the third whitespace token of the preamble line is
    /// the original source address.
    async fn read_proxy_preamble(&mut self) -> Result {
        let line = match self.reader.next().await {
            Some(Ok(line)) => line,
            Some(Err(err)) => bail!("error reading proxy preamble: {err}"),
            None => bail!("connection closed before proxy preamble"),
        };

        ensure!(
            line.starts_with("PROXY"),
            "expected proxy preamble, got {line:?}"
        );

        self.remote = line
            .split_whitespace()
            .nth(2)
            .context("proxy preamble is missing the source address")?
            .parse()
            .context("invalid source address in proxy preamble")?;

        Ok(())
    }

    async fn subscribe(&mut self, id: Id, _subscribe: Subscribe) -> Result {
        let extranonce1 = self.job_manager.next_extranonce();

        let result = SubscribeResult {
            session_id: Some(self.session_id.clone()),
            extranonce1: extranonce1.clone(),
        };

        self.send(Message::Response {
            id,
            result: Some(json!(result)),
            error: None,
        })
        .await?;

        self.extranonce1 = Some(extranonce1);

        self.send_difficulty(self.difficulty).await?;

        if let Some(template) = self.job_manager.current_template() {
            self.send_notify(template.job_params(true)).await?;
        }

        Ok(())
    }

    async fn authorize(&mut self, id: Id, authorize: Authorize) -> Result {
        let worker = WorkerName::parse(&authorize.username);

        let reply = self
            .authorizer
            .authorize(
                self.remote,
                self.port.port,
                &worker,
                authorize.password.as_deref(),
            )
            .await;

        self.send(Message::Response {
            id,
            result: Some(json!(reply.authorized)),
            error: reply.error.map(|error| error.to_wire()),
        })
        .await?;

        if reply.authorized {
            info!(remote = %self.remote, worker = %worker, "authorized");
            self.worker = Some(worker);
            self.authorized = true;
        }

        ensure!(!reply.disconnect, "authorizer requested disconnect");

        Ok(())
    }

    async fn submit(&mut self, id: Id, submit: Submit) -> Result {
        let Some(extranonce1) = self.extranonce1.clone() else {
            self.shares.record(false);
            self.send_error(id, StratumError::not_subscribed()).await?;
            return self.enforce_ban_policy().await;
        };

        if !self.authorized {
            self.shares.record(false);
            self.send_error(id, StratumError::unauthorized_worker())
                .await?;
            return self.enforce_ban_policy().await;
        }

        let worker = match &self.worker {
            Some(worker) => worker.clone(),
            None => WorkerName::parse(&submit.worker_name),
        };

        let submission = ShareSubmission {
            job_id: submit.job_id,
            extranonce2: submit.extranonce2.clone(),
            ntime: submit.ntime,
            nonce: extranonce1.to_hex() + &submit.extranonce2,
            solution: submit.solution,
            worker,
            remote: self.remote,
            port: self.port.port,
            difficulty: self.difficulty,
            previous_difficulty: self.previous_difficulty,
        };

        match self.job_manager.process_share(&submission) {
            Ok(accepted) => {
                self.shares.record(true);
                if accepted.is_block() {
                    info!(
                        remote = %self.remote,
                        height = accepted.height,
                        hash = accepted.block_hash.as_deref().unwrap_or_default(),
                        "block candidate found"
                    );
                }
                self.send(Message::Response {
                    id,
                    result: Some(json!(true)),
                    error: None,
                })
                .await?;
            }
            Err(error) => {
                self.shares.record(false);
                debug!(remote = %self.remote, "share rejected: {error}");
                self.send_error(id, error).await?;
            }
        }

        self.enforce_ban_policy().await
    }

    async fn push_job(&mut self, event: JobEvent) -> Result {
        if self.extranonce1.is_none() {
            return Ok(());
        }

        let idle = Duration::from_secs(self.settings.connection_timeout);
        ensure!(
            self.last_activity.elapsed() <= idle,
            "dropping idle connection {}",
            self.remote
        );

        if let Some(difficulty) = self.pending_difficulty.take() {
            if difficulty != self.difficulty {
                self.previous_difficulty = Some(self.difficulty);
                self.difficulty = difficulty;
                self.send_difficulty(difficulty).await?;
            }
        }

        self.send_notify(event.template().job_params(event.clean_jobs()))
            .await
    }

    async fn send_difficulty(&mut self, difficulty: f64) -> Result {
        self.send(Message::Notification {
            method: "mining.set_target".into(),
            params: json!(SetTarget::from_difficulty(difficulty)),
        })
        .await
    }

    async fn send_notify(&mut self, notify: Notify) -> Result {
        self.send(Message::Notification {
            method: "mining.notify".into(),
            params: json!(notify),
        })
        .await
    }

    /// Bails out of the session when the invalid share ratio crosses the
    /// configured threshold, recording a ban for the client address.
    async fn enforce_ban_policy(&mut self) -> Result {
        let Some(banning) = &self.settings.banning else {
            return Ok(());
        };

        if !self.shares.should_ban(banning) {
            return Ok(());
        }

        self.bans.record(self.remote);
        self.events
            .send(ServerEvent::ClientBanned(self.remote))
            .ok();

        bail!(
            "banned {} after {} invalid of {} shares",
            self.remote,
            self.shares.invalid,
            self.shares.total(),
        );
    }

    async fn read_message(&mut self) -> Result<Option<Message>> {
        match self.reader.next().await {
            Some(Ok(line)) => {
                let message = serde_json::from_str::<Message>(&line).map_err(|e| {
                    anyhow!("invalid stratum message from {}: {e}; line={line:?}", self.remote)
                })?;
                Ok(Some(message))
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                Err(anyhow!("flooding message from {}", self.remote))
            }
            Some(Err(e)) => Err(anyhow!("read error from {}: {e}", self.remote)),
            None => Ok(None),
        }
    }

    async fn send(&mut self, message: Message) -> Result {
        let frame = serde_json::to_string(&message)?;
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn send_error(&mut self, id: Id, error: StratumError) -> Result {
        self.send(Message::Response {
            id,
            result: None,
            error: Some(error.to_wire()),
        })
        .await
    }
}

/// Per-session share tally feeding the ban policy.
#[derive(Debug, Default)]
struct ShareCounter {
    valid: u64,
    invalid: u64,
}

impl ShareCounter {
    fn record(&mut self, valid: bool) {
        if valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }
    }

    fn total(&self) -> u64 {
        self.valid + self.invalid
    }

    fn should_ban(&mut self, banning: &BanningSettings) -> bool {
        if self.total() < banning.check_threshold {
            return false;
        }

        let invalid_percent = self.invalid as f64 / self.total() as f64 * 100.0;

        if invalid_percent < banning.invalid_percent {
            // healthy miner, start a fresh window
            self.valid = 0;
            self.invalid = 0;
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::AddressAuthorizer, daemon::DaemonReply, verify::AcceptAll},
        tokio::io::{DuplexStream, ReadHalf, WriteHalf},
        tokio_util::codec::Framed,
    };

    struct StubDaemon;

    #[async_trait]
    impl Daemon for StubDaemon {
        async fn cmd(&self, _method: &str, _params: Value) -> Result<Vec<DaemonReply>> {
            Ok(Vec::new())
        }
    }

    fn address(fill: u8) -> String {
        let mut payload = vec![0x1c, 0xb8];
        payload.extend_from_slice(&[fill; 20]);
        base58::encode_check(&payload)
    }

    fn settings() -> Arc<PoolSettings> {
        Arc::new(
            serde_json::from_str(&format!(
                r#"{{
                    "pool_address": "{}",
                    "instance_id": 1,
                    "ports": [{{"port": 3333, "difficulty": 1.0}}]
                }}"#,
                address(1),
            ))
            .unwrap(),
        )
    }

    struct Harness {
        client: Framed<DuplexStream, LinesCodec>,
        job_manager: Arc<JobManager>,
    }

    async fn harness() -> Harness {
        let settings = settings();
        let policy: CoinPolicy =
            serde_json::from_str(r#"{"name":"zcash","symbol":"ZEC"}"#).unwrap();
        let job_manager = Arc::new(
            JobManager::new(policy, &settings, Arc::new(StubDaemon), Arc::new(AcceptAll))
                .unwrap(),
        );

        let rpc: RpcBlockData = serde_json::from_str(&format!(
            r#"{{
                "previousblockhash": "{}aa",
                "target": "{}",
                "bits": "1f07ffff",
                "curtime": 1600000000,
                "height": 10,
                "version": 4,
                "miner": 6.25
            }}"#,
            "0".repeat(62),
            "f".repeat(64),
        ))
        .unwrap();
        job_manager.process_template(rpc).await.unwrap();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer): (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) =
            tokio::io::split(server);

        let connection = Connection::new(
            settings,
            job_manager.clone(),
            Arc::new(AddressAuthorizer),
            Arc::new(BanTable::new(None)),
            broadcast::channel(SERVER_CHANNEL_CAPACITY).0,
            PortSettings {
                port: 3333,
                difficulty: 1.0,
                proxy_protocol: false,
            },
            "127.0.0.1".parse().unwrap(),
            "deadbeefcafebabe00000001".into(),
            reader,
            writer,
        );

        tokio::spawn(connection.serve());

        Harness {
            client: Framed::new(client, LinesCodec::new()),
            job_manager,
        }
    }

    impl Harness {
        async fn send(&mut self, line: &str) {
            self.client.send(line.to_string()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.client.next().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    #[tokio::test]
    async fn subscribe_flow() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":1,"method":"mining.subscribe","params":["miner/1.0",null]}"#)
            .await;

        let response = harness.recv().await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"][0], "deadbeefcafebabe00000001");
        assert_eq!(response["result"][1], "08000001");

        let set_target = harness.recv().await;
        assert_eq!(set_target["method"], "mining.set_target");
        assert_eq!(
            set_target["params"][0],
            "0007ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
        );

        let notify = harness.recv().await;
        assert_eq!(notify["method"], "mining.notify");
        let params = notify["params"].as_array().unwrap();
        assert_eq!(params.len(), 8);
        assert_eq!(params[0], "cccd");
        assert_eq!(params[7], true);
    }

    #[tokio::test]
    async fn authorize_accepts_valid_address() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":1,"method":"mining.subscribe","params":[]}"#)
            .await;
        harness.recv().await;
        harness.recv().await;
        harness.recv().await;

        harness
            .send(&format!(
                r#"{{"id":2,"method":"mining.authorize","params":["{}.rig1","x"]}}"#,
                address(2),
            ))
            .await;

        let response = harness.recv().await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"], true);
        assert_eq!(response["error"], Value::Null);
    }

    #[tokio::test]
    async fn authorize_rejects_garbage_address() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":2,"method":"mining.authorize","params":["junk.rig1"]}"#)
            .await;

        let response = harness.recv().await;
        assert_eq!(response["result"], false);
        assert_eq!(response["error"][0], 24);
    }

    #[tokio::test]
    async fn submit_before_subscribe_is_code_25() {
        let mut harness = harness().await;

        harness
            .send(
                r#"{"id":3,"method":"mining.submit","params":["w","cccd","00105e5f","00","ab"]}"#,
            )
            .await;

        let response = harness.recv().await;
        assert_eq!(response["result"], Value::Null);
        assert_eq!(response["error"][0], 25);
        assert_eq!(response["error"][1], "not subscribed");
    }

    #[tokio::test]
    async fn submit_before_authorize_is_code_24() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":1,"method":"mining.subscribe","params":[]}"#)
            .await;
        harness.recv().await;
        harness.recv().await;
        harness.recv().await;

        harness
            .send(
                r#"{"id":3,"method":"mining.submit","params":["w","cccd","00105e5f","00","ab"]}"#,
            )
            .await;

        let response = harness.recv().await;
        assert_eq!(response["error"][0], 24);
    }

    #[tokio::test]
    async fn full_share_submission_round() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":1,"method":"mining.subscribe","params":[]}"#)
            .await;
        harness.recv().await;
        harness.recv().await;
        let notify = harness.recv().await;
        let job_id = notify["params"][0].as_str().unwrap().to_string();

        harness
            .send(&format!(
                r#"{{"id":2,"method":"mining.authorize","params":["{}.rig1"]}}"#,
                address(2),
            ))
            .await;
        harness.recv().await;

        // extranonce2 fills the 32-byte nonce after the 4-byte extranonce1
        let extranonce2 = "00".repeat(28);
        let solution = "01".repeat(1347);
        harness
            .send(&format!(
                r#"{{"id":4,"method":"mining.submit","params":["{}.rig1","{job_id}","00105e5f","{extranonce2}","{solution}"]}}"#,
                address(2),
            ))
            .await;

        let response = harness.recv().await;
        assert_eq!(response["id"], 4);
        assert_eq!(response["result"], true);

        // an identical resubmission is a duplicate
        harness
            .send(&format!(
                r#"{{"id":5,"method":"mining.submit","params":["{}.rig1","{job_id}","00105e5f","{extranonce2}","{solution}"]}}"#,
                address(2),
            ))
            .await;
        let response = harness.recv().await;
        assert_eq!(response["error"][0], 22);
    }

    #[tokio::test]
    async fn unsupported_methods_are_rejected() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":7,"method":"mining.extranonce.subscribe","params":[]}"#)
            .await;
        let response = harness.recv().await;
        assert_eq!(response["result"], false);
        assert_eq!(response["error"][0], 20);

        harness
            .send(r#"{"id":8,"method":"mining.get_transactions","params":[]}"#)
            .await;
        let response = harness.recv().await;
        assert_eq!(response["result"], json!([]));
        assert_eq!(response["error"][0], 20);
    }

    #[tokio::test]
    async fn new_jobs_are_pushed_to_subscribed_sessions() {
        let mut harness = harness().await;

        harness
            .send(r#"{"id":1,"method":"mining.subscribe","params":[]}"#)
            .await;
        harness.recv().await;
        harness.recv().await;
        harness.recv().await;

        let rpc: RpcBlockData = serde_json::from_str(&format!(
            r#"{{
                "previousblockhash": "{}bb",
                "target": "{}",
                "bits": "1f07ffff",
                "curtime": 1600000000,
                "height": 11,
                "version": 4,
                "miner": 6.25
            }}"#,
            "0".repeat(62),
            "f".repeat(64),
        ))
        .unwrap();
        harness.job_manager.process_template(rpc).await.unwrap();

        let notify = harness.recv().await;
        assert_eq!(notify["method"], "mining.notify");
        assert_eq!(notify["params"][7], true);
    }

    #[test]
    fn share_counter_ban_policy() {
        let banning: BanningSettings =
            serde_json::from_str(r#"{"check_threshold": 10, "invalid_percent": 50.0}"#).unwrap();

        let mut counter = ShareCounter::default();
        for _ in 0..4 {
            counter.record(true);
        }
        for _ in 0..5 {
            counter.record(false);
        }
        assert!(!counter.should_ban(&banning), "below the check threshold");

        counter.record(false);
        assert!(counter.should_ban(&banning), "60% invalid");

        let mut healthy = ShareCounter::default();
        for _ in 0..9 {
            healthy.record(true);
        }
        healthy.record(false);
        assert!(!healthy.should_ban(&banning));
        assert_eq!(healthy.total(), 0, "window resets for healthy miners");
    }
}
