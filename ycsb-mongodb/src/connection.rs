use crate::config::MongoConfig;
use crate::endpoint::Endpoint;
use crate::memory::{InMemoryEndpoint, MEMORY_SCHEME};
use crate::mongo::MongoEndpoint;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ycsb::{ErrorKind, Properties, YcsbError, YcsbResult};

/// Builds the connection set for a freshly parsed configuration.
pub type Connector = dyn Fn(&MongoConfig) -> YcsbResult<ConnectionSet> + Send + Sync;

static GLOBAL_REGISTRY: Lazy<ConnectionRegistry> = Lazy::new(ConnectionRegistry::new);

/// The endpoints every worker shares, in configuration order, plus the
/// round-robin cursor used to spread operations over them.
pub struct ConnectionSet {
    endpoints: Vec<Arc<dyn Endpoint>>,
    cursor: AtomicUsize,
}

impl ConnectionSet {
    pub fn new(endpoints: Vec<Arc<dyn Endpoint>>) -> YcsbResult<ConnectionSet> {
        if endpoints.is_empty() {
            log::error!("Connection set requires at least one endpoint");
            return Err(YcsbError::new(
                "Connection set requires at least one endpoint",
                ErrorKind::InvalidConfiguration,
            ));
        }
        Ok(ConnectionSet {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Opens one endpoint per configured connection string.
    ///
    /// `memory://` strings open an [`InMemoryEndpoint`], everything else a
    /// [`MongoEndpoint`]. If any endpoint fails to open, the ones already
    /// opened are closed again and the failure is returned with the same
    /// kind, naming the connection string and chained to the driver error.
    pub fn open(config: &MongoConfig) -> YcsbResult<ConnectionSet> {
        let mut endpoints: Vec<Arc<dyn Endpoint>> = Vec::with_capacity(config.urls().len());
        for url in config.urls() {
            log::info!("Found server connection string {}", url);
            match open_endpoint(url, config) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(err) => {
                    close_all(&endpoints);
                    return Err(YcsbError::new_with_cause(
                        &format!("Could not open endpoint {}: {}", url, err),
                        err.kind().clone(),
                        err,
                    ));
                }
            }
        }
        ConnectionSet::new(endpoints)
    }

    /// Picks the endpoint for the next operation.
    ///
    /// Successive calls cycle through the endpoints in configuration order.
    /// The cursor is shared, so concurrent callers still spread evenly.
    pub fn next(&self) -> &Arc<dyn Endpoint> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[index]
    }

    pub fn endpoint(&self, index: usize) -> Option<&Arc<dyn Endpoint>> {
        self.endpoints.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Closes every endpoint. Failures are logged and do not stop the rest.
    pub fn close(&self) {
        close_all(&self.endpoints);
    }
}

impl Debug for ConnectionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let addresses: Vec<&str> = self.endpoints.iter().map(|e| e.address()).collect();
        f.debug_struct("ConnectionSet")
            .field("endpoints", &addresses)
            .finish()
    }
}

fn open_endpoint(url: &str, config: &MongoConfig) -> YcsbResult<Arc<dyn Endpoint>> {
    if url.starts_with(MEMORY_SCHEME) {
        log::info!("mongo connection created with {}", url);
        Ok(Arc::new(InMemoryEndpoint::new(url)))
    } else {
        Ok(Arc::new(MongoEndpoint::connect(url, config)?))
    }
}

fn close_all(endpoints: &[Arc<dyn Endpoint>]) {
    for endpoint in endpoints {
        if let Err(err) = endpoint.close() {
            log::error!("Could not close connection to {}: {}", endpoint.address(), err);
        }
    }
}

#[derive(Clone)]
struct Shared {
    config: MongoConfig,
    connections: Arc<ConnectionSet>,
}

struct RegistryState {
    init_count: usize,
    shared: Option<Shared>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    connector: Box<Connector>,
}

/// Reference-counted owner of the configuration and connections shared by
/// every client bound to it.
///
/// The first successful [`acquire`](ConnectionRegistry::acquire) parses the
/// configuration and opens the connections; later ones reuse them. Every
/// `acquire` counts as one reference, failed ones included, and the
/// [`release`](ConnectionRegistry::release) that drops the count to zero
/// closes the connections and forgets them so the next `acquire` starts over.
/// Both run under one lock.
///
/// Clones are handles to the same registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates a registry that opens connections with [`ConnectionSet::open`].
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry::with_connector(ConnectionSet::open)
    }

    /// The process-wide registry used by [`crate::MongoDbClient::new`].
    pub fn global() -> ConnectionRegistry {
        GLOBAL_REGISTRY.clone()
    }

    /// Creates a registry that builds its connection set with `connector`.
    pub fn with_connector<F>(connector: F) -> ConnectionRegistry
    where
        F: Fn(&MongoConfig) -> YcsbResult<ConnectionSet> + Send + Sync + 'static,
    {
        ConnectionRegistry {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState {
                    init_count: 0,
                    shared: None,
                }),
                connector: Box::new(connector),
            }),
        }
    }

    /// Takes one reference and returns the shared configuration and
    /// connections, creating them if no live reference holds them.
    ///
    /// The reference is counted even when this returns an error, so every
    /// call must be paired with one [`release`](ConnectionRegistry::release).
    pub fn acquire(&self, properties: &Properties) -> YcsbResult<(MongoConfig, Arc<ConnectionSet>)> {
        let mut state = self.inner.state.lock();
        state.init_count += 1;

        if let Some(shared) = &state.shared {
            return Ok((shared.config.clone(), shared.connections.clone()));
        }

        let config = MongoConfig::from_properties(properties)?;
        let connections = Arc::new((self.inner.connector)(&config)?);
        log::debug!(
            "Opened {} connection(s) to database {}",
            connections.len(),
            config.database()
        );

        state.shared = Some(Shared {
            config: config.clone(),
            connections: connections.clone(),
        });
        Ok((config, connections))
    }

    /// Drops one reference. Returns `true` if this call closed the shared
    /// connections.
    pub fn release(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.init_count == 0 {
            log::warn!("Connection registry released more often than acquired");
            return false;
        }

        state.init_count -= 1;
        if state.init_count > 0 {
            return false;
        }

        match state.shared.take() {
            Some(shared) => {
                shared.connections.close();
                true
            }
            None => false,
        }
    }

    pub fn init_count(&self) -> usize {
        self.inner.state.lock().init_count
    }

    pub fn connections(&self) -> Option<Arc<ConnectionSet>> {
        let state = self.inner.state.lock();
        state.shared.as_ref().map(|shared| shared.connections.clone())
    }

    pub fn config(&self) -> Option<MongoConfig> {
        let state = self.inner.state.lock();
        state.shared.as_ref().map(|shared| shared.config.clone())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
