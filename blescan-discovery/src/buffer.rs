use std::ops::Deref;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;

/// Below this many bytes, a per-notification snapshot is a plain copy; a
/// reusable backing array is not worth the bookkeeping for a handful of
/// bytes.
pub const NOTIFICATION_POOL_THRESHOLD: usize = 100;
/// Below this many bytes, a full-message (aggregate) snapshot is a plain
/// copy; above it the snapshot borrows a backing array from the pool.
pub const AGGREGATE_POOL_THRESHOLD: usize = 512;

type Pool = Arc<Mutex<Vec<BytesMut>>>;

/// Thread-safe, append-only accumulator for inbound notification fragments.
/// Exactly one session owns a `Buffer` at a time; the notification handler
/// (running on whatever thread the adapter delivers on) and the request
/// waiter synchronize through this type alone (§9) — never by calling into
/// each other directly.
pub struct Buffer {
    data: Mutex<BytesMut>,
    pool: Pool,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Buffer {
            data: Mutex::new(BytesMut::new()),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends `bytes` to the end of the buffer. Atomic: concurrent callers
    /// never interleave their writes, and ordering across calls follows
    /// lock acquisition order.
    pub fn append(&self, bytes: &[u8]) {
        let mut data = self.data.lock().expect("buffer mutex poisoned");
        data.extend_from_slice(bytes);
    }

    /// Returns a plain copy of the buffer's current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        let data = self.data.lock().expect("buffer mutex poisoned");
        data.to_vec()
    }

    /// Returns a copy of the buffer's current contents, backed by a
    /// reusable array from the pool once `data.len()` reaches
    /// `pool_threshold`. The returned handle owns its slice until dropped,
    /// at which point the backing array (if pooled) is cleared and
    /// returned to the pool — never handed to two holders at once, since
    /// taking it out of the free list happens under the pool's lock.
    #[must_use]
    pub fn snapshot_pooled(&self, pool_threshold: usize) -> PooledSnapshot {
        let data = self.data.lock().expect("buffer mutex poisoned");
        if data.len() < pool_threshold {
            return PooledSnapshot::Plain(data.to_vec());
        }
        let mut buf = {
            let mut pool = self.pool.lock().expect("buffer pool mutex poisoned");
            pool.pop().unwrap_or_default()
        };
        buf.clear();
        buf.extend_from_slice(&data);
        PooledSnapshot::Pooled(buf, self.pool.clone())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.lock().expect("buffer mutex poisoned").len()
    }

    /// Clears the buffer. Called at the start of every request (§3
    /// invariant): a session's buffer is cleared before each request and
    /// not read from until a complete message arrives or the deadline
    /// elapses.
    pub fn clear(&self) {
        self.data.lock().expect("buffer mutex poisoned").clear();
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot returned by [`Buffer::snapshot_pooled`]. Derefs to `[u8]`; its
/// backing array, if pooled, is returned to the pool on drop.
pub enum PooledSnapshot {
    Plain(Vec<u8>),
    Pooled(BytesMut, Pool),
}

impl Deref for PooledSnapshot {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            PooledSnapshot::Plain(v) => v,
            PooledSnapshot::Pooled(b, _) => b,
        }
    }
}

impl Drop for PooledSnapshot {
    fn drop(&mut self) {
        if let PooledSnapshot::Pooled(buf, pool) = self {
            let returned = std::mem::take(buf);
            if let Ok(mut pool) = pool.lock() {
                pool.push(returned);
            }
        }
    }
}
