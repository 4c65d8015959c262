use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

use postgres::{Client, Config, NoTls};
use unidb_core::{DbError, Result};

/// Bounded blocking connection pool.
///
/// Holds `[minconn, maxconn]` connections; `acquire` hands out an idle one,
/// opens a new one while under the cap, and otherwise blocks until a
/// connection is released. `close` discards every idle connection and fails
/// all waiters.
pub(crate) struct Pool {
    config: Config,
    maxconn: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

struct PoolState {
    idle: Vec<Client>,
    total: usize,
    closed: bool,
}

impl Pool {
    pub(crate) fn new(config: Config, minconn: usize, maxconn: usize) -> Result<Self> {
        let mut idle = Vec::with_capacity(minconn);
        for _ in 0..minconn {
            idle.push(connect(&config)?);
        }
        log::info!("postgres pool ready ({minconn}/{maxconn} connections)");

        Ok(Self {
            config,
            maxconn,
            state: Mutex::new(PoolState {
                total: idle.len(),
                idle,
                closed: false,
            }),
            available: Condvar::new(),
        })
    }

    pub(crate) fn acquire(&self) -> Result<PooledClient<'_>> {
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(DbError::NotOpen);
            }

            if let Some(client) = state.idle.pop() {
                return Ok(PooledClient {
                    pool: self,
                    client: Some(client),
                });
            }

            if state.total < self.maxconn {
                state.total += 1;
                drop(state);
                match connect(&self.config) {
                    Ok(client) => {
                        return Ok(PooledClient {
                            pool: self,
                            client: Some(client),
                        });
                    }
                    Err(e) => {
                        let mut state = self.lock()?;
                        state.total -= 1;
                        self.available.notify_one();
                        return Err(e);
                    }
                }
            }

            state = self
                .available
                .wait(state)
                .map_err(|e| DbError::driver(format!("pool lock poisoned: {e}")))?;
        }
    }

    pub(crate) fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            let discarded = state.idle.len();
            state.idle.clear();
            state.total -= discarded;
            log::info!("postgres pool closed ({discarded} idle connections discarded)");
        }
        self.available.notify_all();
    }

    fn release(&self, client: Client) {
        if let Ok(mut state) = self.state.lock() {
            if state.closed || client.is_closed() {
                state.total -= 1;
            } else {
                state.idle.push(client);
            }
        }
        self.available.notify_one();
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|e| DbError::driver(format!("pool lock poisoned: {e}")))
    }
}

fn connect(config: &Config) -> Result<Client> {
    config
        .connect(NoTls)
        .map_err(|e| DbError::driver(format!("connection failed: {e}")))
}

/// A connection checked out of the pool; returns on drop.
pub(crate) struct PooledClient<'p> {
    pool: &'p Pool,
    client: Option<Client>,
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client already released")
    }
}

impl DerefMut for PooledClient<'_> {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client already released")
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
