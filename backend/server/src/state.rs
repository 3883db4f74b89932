use std::sync::Arc;

use ledger::{MemoryStore, RedisStore, Store};
use tracing::{info, warn};

use crate::{
    config::{Config, LedgerBackend},
    gotrue::GoTrueBackend,
    identity::Identity,
    notify::ChangeNotifier,
    votes::VoteWriter,
};

pub struct AppState {
    pub config: Config,
    /// `None` when the identity backend is not configured.
    pub identity: Option<Identity>,
    pub store: Arc<dyn Store>,
    pub notifier: ChangeNotifier,
    pub votes: VoteWriter,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match config.ledger_backend {
            LedgerBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
            LedgerBackend::Memory => {
                warn!("Using the in-memory ledger, votes are lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let identity = match &config.identity {
            Some(identity) => {
                let backend = GoTrueBackend::new(identity, config.auth_timeout)?;
                info!("Identity backend at {}", identity.url);
                Some(Identity::new(Arc::new(backend)))
            }
            None => None,
        };

        Ok(Self::from_parts(config, identity, store))
    }

    pub fn from_parts(config: Config, identity: Option<Identity>, store: Arc<dyn Store>) -> Arc<Self> {
        let notifier = ChangeNotifier::new(config.notify_capacity);
        let votes = VoteWriter::new(store.clone(), notifier.clone());

        Arc::new(Self {
            config,
            identity,
            store,
            notifier,
            votes,
        })
    }
}
