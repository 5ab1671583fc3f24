use super::*;

/// Out-of-band notifications for whoever embeds the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// No job was broadcast within the rebroadcast window, usually a sign
    /// the daemon poller stalled.
    BroadcastTimeout,
    ClientBanned(IpAddr),
}

/// Control messages delivered to a single live session.
#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    SetDifficulty(f64),
}

pub struct StratumServer {
    settings: Arc<PoolSettings>,
    job_manager: Arc<JobManager>,
    authorizer: Arc<dyn Authorizer>,
    bans: Arc<BanTable>,
    sessions: DashMap<String, mpsc::UnboundedSender<ConnectionCommand>>,
    subscription_counter: Mutex<u64>,
    events: broadcast::Sender<ServerEvent>,
}

impl StratumServer {
    pub fn new(
        settings: Arc<PoolSettings>,
        job_manager: Arc<JobManager>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            bans: Arc::new(BanTable::new(settings.banning.as_ref())),
            settings,
            job_manager,
            authorizer,
            sessions: DashMap::new(),
            subscription_counter: Mutex::new(0),
            events: broadcast::channel(SERVER_CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn bans(&self) -> &Arc<BanTable> {
        &self.bans
    }

    /// Retargets one session by id. Returns false if the session is gone.
    pub fn set_difficulty(&self, session_id: &str, difficulty: f64) -> bool {
        match self.sessions.get(session_id) {
            Some(session) => session
                .send(ConnectionCommand::SetDifficulty(difficulty))
                .is_ok(),
            None => false,
        }
    }

    pub async fn run(self: Arc<Self>) -> Result {
        if let Some(banning) = &self.settings.banning {
            let bans = self.bans.clone();
            let purge_interval = Duration::from_secs(banning.purge_interval);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(purge_interval);
                loop {
                    interval.tick().await;
                    bans.purge();
                }
            });
        }

        {
            let server = self.clone();
            let window = Duration::from_secs(self.settings.job_rebroadcast_timeout);
            let mut jobs = self.job_manager.subscribe_jobs();
            tokio::spawn(async move {
                loop {
                    match tokio::time::timeout(window, jobs.recv()).await {
                        Err(_) => {
                            warn!("no job broadcast in {}s", window.as_secs());
                            server.events.send(ServerEvent::BroadcastTimeout).ok();
                        }
                        Ok(Err(broadcast::error::RecvError::Closed)) => break,
                        Ok(_) => {}
                    }
                }
            });
        }

        let mut listeners = JoinSet::new();

        for port in &self.settings.ports {
            let server = self.clone();
            let port = port.clone();
            listeners.spawn(async move { server.listen(port).await });
        }

        while let Some(result) = listeners.join_next().await {
            result??;
        }

        Ok(())
    }

    async fn listen(self: Arc<Self>, port: PortSettings) -> Result {
        let listener = TcpListener::bind(("0.0.0.0", port.port))
            .await
            .with_context(|| format!("failed to bind stratum port {}", port.port))?;

        info!(port = port.port, difficulty = port.difficulty, "listening");

        loop {
            let (socket, peer) = listener.accept().await?;

            // proxied connections reveal their real source later, so the
            // ban check for those happens inside the session
            if !port.proxy_protocol && !self.bans.allowed(peer.ip()) {
                debug!(remote = %peer.ip(), "refused banned client");
                continue;
            }

            socket.set_nodelay(true).ok();

            let server = self.clone();
            let port = port.clone();
            tokio::spawn(async move {
                let session_id = server.next_session_id();
                let (reader, writer) = socket.into_split();
                let connection = Connection::new(
                    server.settings.clone(),
                    server.job_manager.clone(),
                    server.authorizer.clone(),
                    server.bans.clone(),
                    server.events.clone(),
                    port,
                    peer.ip(),
                    session_id.clone(),
                    reader,
                    writer,
                );

                server.sessions.insert(session_id.clone(), connection.commands());

                if let Err(err) = connection.serve().await {
                    debug!(session = %session_id, "session ended: {err:#}");
                }

                server.sessions.remove(&session_id);
            });
        }
    }

    fn next_session_id(&self) -> String {
        let mut counter = self.subscription_counter.lock();
        *counter += 1;
        format!("{SUBSCRIPTION_PADDING}{:08x}", *counter)
    }
}

/// Temporary bans keyed by address, plus the statically denied set.
pub struct BanTable {
    entries: DashMap<IpAddr, Instant>,
    deny: HashSet<IpAddr>,
    duration: Duration,
    enabled: bool,
}

impl BanTable {
    pub fn new(settings: Option<&BanningSettings>) -> Self {
        Self {
            entries: DashMap::new(),
            deny: settings
                .map(|banning| banning.banned.iter().copied().collect())
                .unwrap_or_default(),
            duration: Duration::from_secs(settings.map(|banning| banning.time).unwrap_or(0)),
            enabled: settings.is_some(),
        }
    }

    pub fn allowed(&self, remote: IpAddr) -> bool {
        if self.deny.contains(&remote) {
            return false;
        }

        if !self.enabled {
            return true;
        }

        let expired = match self.entries.get(&remote) {
            None => return true,
            Some(banned_at) => banned_at.elapsed() >= self.duration,
        };

        if !expired {
            return false;
        }

        // the map guard is released above, so this cannot deadlock
        self.entries.remove(&remote);
        true
    }

    pub fn record(&self, remote: IpAddr) {
        if self.enabled {
            self.entries.insert(remote, Instant::now());
        }
    }

    pub fn purge(&self) {
        self.entries
            .retain(|_, banned_at| banned_at.elapsed() < self.duration);
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::AddressAuthorizer, daemon::DaemonReply, verify::AcceptAll},
    };

    fn banning(json: &str) -> BanningSettings {
        serde_json::from_str(json).unwrap()
    }

    fn remote(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn disabled_table_allows_everyone() {
        let table = BanTable::new(None);
        table.record(remote(1));
        assert!(table.allowed(remote(1)));
    }

    #[test]
    fn static_denies_hold_even_when_disabled() {
        let table = BanTable::new(Some(&banning(r#"{"banned": ["10.0.0.7"]}"#)));
        assert!(!table.allowed(remote(7)));
        assert!(table.allowed(remote(8)));
    }

    #[test]
    fn recorded_ban_blocks_until_expiry() {
        let table = BanTable::new(Some(&banning(r#"{"time": 600}"#)));
        assert!(table.allowed(remote(1)));
        table.record(remote(1));
        assert!(!table.allowed(remote(1)));
        assert!(table.allowed(remote(2)));
    }

    #[test]
    fn expired_ban_is_dropped_on_check() {
        let table = BanTable::new(Some(&banning(r#"{"time": 0}"#)));
        table.record(remote(1));
        assert!(table.allowed(remote(1)));
        assert!(table.entries.is_empty());
    }

    #[test]
    fn purge_clears_expired_entries() {
        let table = BanTable::new(Some(&banning(r#"{"time": 0}"#)));
        table.record(remote(1));
        table.record(remote(2));
        table.purge();
        assert!(table.entries.is_empty());
    }

    #[test]
    fn session_ids_are_padded_and_sequential() {
        let settings: Arc<PoolSettings> = Arc::new(
            serde_json::from_str(r#"{"pool_address": "a", "ports": [{"port": 3333}]}"#).unwrap(),
        );
        let policy: CoinPolicy =
            serde_json::from_str(r#"{"name":"zcash","symbol":"ZEC"}"#).unwrap();

        struct NoDaemon;

        #[async_trait]
        impl Daemon for NoDaemon {
            async fn cmd(&self, _: &str, _: Value) -> Result<Vec<DaemonReply>> {
                Ok(Vec::new())
            }
        }

        let mut pool_settings = (*settings).clone();
        pool_settings.pool_address = {
            let mut payload = vec![0x1c, 0xb8];
            payload.extend_from_slice(&[1u8; 20]);
            base58::encode_check(&payload)
        };

        let job_manager = Arc::new(
            JobManager::new(policy, &pool_settings, Arc::new(NoDaemon), Arc::new(AcceptAll))
                .unwrap(),
        );

        let server = StratumServer::new(settings, job_manager, Arc::new(AddressAuthorizer));
        assert_eq!(server.next_session_id(), "deadbeefcafebabe00000001");
        assert_eq!(server.next_session_id(), "deadbeefcafebabe00000002");
        assert!(!server.set_difficulty("deadbeefcafebabe00000001", 2.0));
    }
}
