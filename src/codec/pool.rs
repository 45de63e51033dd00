//! Shared buffer pool for encode and decompress paths.
//!
//! `encode` and the pooled decompress variant hand out [`PooledBuf`] guards;
//! dropping the guard returns the underlying allocation to the pool, so hot
//! save/load loops reuse a small set of large buffers instead of
//! reallocating per file.

use std::ops::Deref;
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Buffers kept alive in the pool at most.
const MAX_POOLED: usize = 32;

/// Buffers larger than this are dropped on return rather than retained.
const MAX_RETAINED_CAPACITY: usize = 8 * 1024 * 1024;

static GLOBAL: Lazy<BufferPool> = Lazy::new(BufferPool::default);

/// A mutex-guarded stack of reusable byte buffers.
#[derive(Default)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// The process-wide pool used by the codec and compression modules.
    pub fn global() -> &'static BufferPool {
        &GLOBAL
    }

    /// Take a cleared buffer with at least `capacity` bytes of room.
    pub fn get(&'static self, capacity: usize) -> PooledBuf {
        let mut buffers = self.buffers.lock().expect("buffer pool poisoned");
        let buf = match buffers.iter().position(|b| b.capacity() >= capacity) {
            Some(idx) => buffers.swap_remove(idx),
            None => Vec::with_capacity(capacity),
        };
        PooledBuf { buf, pool: self }
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() == 0 || buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock().expect("buffer pool poisoned");
        if buffers.len() < MAX_POOLED {
            buffers.push(buf);
        }
    }
}

/// An owned byte buffer checked out of a [`BufferPool`].
///
/// Dereferences to the written content. The allocation goes back to its
/// pool when the guard drops; `into_vec` detaches it instead.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: &'static BufferPool,
}

impl PooledBuf {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Detach the buffer from the pool, keeping its contents.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_returned_buffer() {
        let pool: &'static BufferPool = Box::leak(Box::new(BufferPool::default()));
        let mut buf = pool.get(1024);
        buf.vec_mut().extend_from_slice(b"hello");
        let cap = buf.vec_mut().capacity();
        drop(buf);

        let again = pool.get(512);
        assert_eq!(again.vec_mut_capacity_for_test(), cap);
        assert!(again.is_empty());
    }

    #[test]
    fn test_into_vec_detaches() {
        let pool: &'static BufferPool = Box::leak(Box::new(BufferPool::default()));
        let mut buf = pool.get(16);
        buf.vec_mut().extend_from_slice(b"abc");
        let v = buf.into_vec();
        assert_eq!(v, b"abc");
        // Nothing was returned to the pool.
        assert!(pool.buffers.lock().unwrap().is_empty());
    }

    impl PooledBuf {
        fn vec_mut_capacity_for_test(&self) -> usize {
            self.buf.capacity()
        }
    }
}
