//! Semaphore-bounded connection pool.
//!
//! `postgres::Client` has no built-in pooling; the reference
//! implementation layers a counting semaphore over psycopg2's threaded
//! pool so that `getconn()` blocks rather than raising once `max_conn`
//! connections are checked out. We do the same: a fixed `Vec` of idle
//! clients guarded by a `parking_lot::Condvar`, with the semaphore's
//! "block until a slot frees up" behavior coming from the condvar wait.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use postgres::{Client, NoTls};

use crate::config::DbConfig;
use crate::error::{Error, Result};

struct PoolState {
    idle: Vec<Client>,
    outstanding: usize,
    max: usize,
}

pub struct Pool {
    dsn: String,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Pool {
    pub fn new(cfg: &DbConfig) -> Result<Arc<Pool>> {
        let pool = Pool {
            dsn: cfg.dsn.clone(),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                outstanding: 0,
                max: cfg.max_connections,
            }),
            available: Condvar::new(),
        };
        Ok(Arc::new(pool))
    }

    /// Block until a connection is available, creating a fresh one if the
    /// pool hasn't reached `max_connections` yet.
    pub fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        let mut state = self.state.lock();
        loop {
            if let Some(client) = state.idle.pop() {
                state.outstanding += 1;
                return Ok(PooledConnection {
                    client: Some(client),
                    pool: Arc::clone(self),
                });
            }
            if state.outstanding < state.max {
                state.outstanding += 1;
                let dsn = self.dsn.clone();
                drop(state);
                let client = Client::connect(&dsn, NoTls).map_err(Error::Db)?;
                return Ok(PooledConnection {
                    client: Some(client),
                    pool: Arc::clone(self),
                });
            }
            self.available.wait(&mut state);
        }
    }

    fn release(&self, client: Client) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        state.idle.push(client);
        self.available.notify_one();
    }
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledConnection {
    client: Option<Client>,
    pool: Arc<Pool>,
}

impl std::ops::Deref for PooledConnection {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().expect("connection taken before drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
