//! Connection management for the backing document store
//!
//! The process owns at most one live connection. It is created lazily on
//! first demand, and concurrent callers that arrive while the connection is
//! still being established all await the same in-flight attempt instead of
//! racing separate connects. The state machine is explicit:
//! `Disconnected → Connecting(shared future) → Connected`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use mongodb::{Client, Database, bson::doc};
use tracing::{debug, info, warn};

use crate::config::DatastoreConfig;
use crate::error::{StoreError, StoreResult};

/// Connection factory for a backing store.
///
/// The manager is generic over this trait so the single-flight behavior can
/// be exercised without network access.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    /// Handle to an established connection. Cloning must be cheap; all
    /// callers of the manager share clones of one handle.
    type Conn: Clone + Send + Sync + 'static;

    /// Establish a connection. Called at most once per in-flight attempt.
    async fn connect(&self) -> StoreResult<Self::Conn>;

    /// Close an established connection.
    async fn disconnect(&self, conn: Self::Conn);
}

type SharedConnect<C> = Shared<BoxFuture<'static, StoreResult<C>>>;

enum State<C> {
    Disconnected,
    Connecting(SharedConnect<C>),
    Connected(C),
}

/// Owner of the process-wide store connection.
///
/// `acquire` hands out clones of the live handle without I/O once it
/// exists; `release` closes it so the next `acquire` reconnects.
pub struct ConnectionManager<C: Connect> {
    connector: Arc<C>,
    state: Mutex<State<C::Conn>>,
}

impl<C: Connect> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            state: Mutex::new(State::Disconnected),
        }
    }

    /// Return the live connection, joining or starting a connect attempt as
    /// needed.
    ///
    /// Exactly one underlying connect runs no matter how many callers
    /// arrive concurrently; a failed attempt is reported to every waiter
    /// and leaves the manager ready to retry from scratch.
    pub async fn acquire(&self) -> StoreResult<C::Conn> {
        let pending = {
            let mut state = self.state.lock().expect("connection state lock poisoned");
            match &*state {
                State::Connected(conn) => return Ok(conn.clone()),
                State::Connecting(shared) => {
                    debug!("connection attempt already in flight, joining it");
                    shared.clone()
                }
                State::Disconnected => {
                    debug!("no live connection, starting a connect attempt");
                    let connector = Arc::clone(&self.connector);
                    let shared = async move { connector.connect().await }.boxed().shared();
                    *state = State::Connecting(shared.clone());
                    shared
                }
            }
        };

        self.join_attempt(pending).await
    }

    /// Wait for one connect attempt and record its outcome.
    ///
    /// A waiter may be scheduled long after its attempt resolved, by which
    /// time a newer attempt can already be in flight. The state is only
    /// promoted or demoted when the `Connecting` entry still holds this
    /// waiter's attempt; a stale waiter reports its own result and leaves
    /// the newer attempt untouched.
    async fn join_attempt(&self, pending: SharedConnect<C::Conn>) -> StoreResult<C::Conn> {
        match pending.clone().await {
            Ok(conn) => {
                let mut state = self.state.lock().expect("connection state lock poisoned");
                let current = matches!(&*state, State::Connecting(shared) if shared.ptr_eq(&pending));
                if current {
                    *state = State::Connected(conn.clone());
                }
                Ok(conn)
            }
            Err(error) => {
                warn!(%error, "connect attempt failed");
                let mut state = self.state.lock().expect("connection state lock poisoned");
                let current = matches!(&*state, State::Connecting(shared) if shared.ptr_eq(&pending));
                if current {
                    *state = State::Disconnected;
                }
                Err(error)
            }
        }
    }

    /// Close the live connection, if any.
    ///
    /// A manager without a live connection (including one whose connect is
    /// still in flight) is left untouched and the call completes
    /// successfully.
    pub async fn release(&self) {
        let live = {
            let mut state = self.state.lock().expect("connection state lock poisoned");
            match std::mem::replace(&mut *state, State::Disconnected) {
                State::Connected(conn) => Some(conn),
                other => {
                    *state = other;
                    None
                }
            }
        };

        match live {
            Some(conn) => {
                info!("releasing store connection");
                self.connector.disconnect(conn).await;
            }
            None => debug!("no live connection to release"),
        }
    }
}

/// Established connection to the document store.
#[derive(Clone)]
pub struct MongoHandle {
    pub client: Client,
    pub database: Database,
}

/// Production [`Connect`] implementation backed by the MongoDB driver.
pub struct MongoConnector {
    config: DatastoreConfig,
}

impl MongoConnector {
    pub fn new(config: DatastoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connect for MongoConnector {
    type Conn = MongoHandle;

    async fn connect(&self) -> StoreResult<MongoHandle> {
        info!(url = %self.config.url, database = %self.config.database, "connecting to backing store");

        let client = Client::with_uri_str(&self.config.url)
            .await
            .map_err(StoreError::Connection)?;
        let database = client.database(&self.config.database);

        // The driver connects lazily; ping so a bad endpoint fails the
        // acquire instead of the first query.
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(StoreError::Connection)?;

        Ok(MongoHandle { client, database })
    }

    async fn disconnect(&self, conn: MongoHandle) {
        info!("closing backing store connection");
        conn.client.shutdown().await;
    }
}
