use crate::prelude::FlagError;

/// Scoped scratch-buffer pool that caps how many buffers are out at once.
pub struct BufferPool {
    buffers: Vec<Vec<f32>>,
    outstanding: usize,
    max_capacity: usize,
}

impl BufferPool {
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(max_capacity),
            outstanding: 0,
            max_capacity,
        }
    }

    /// Hands out a zeroed buffer of `length` samples, reusing a released one
    /// when available.
    pub fn checkout(&mut self, length: usize) -> Result<Vec<f32>, FlagError> {
        if self.outstanding >= self.max_capacity {
            return Err(FlagError::inconsistent(format!(
                "scratch pool depleted ({} buffers in use)",
                self.outstanding
            )));
        }
        let mut buffer = self.buffers.pop().unwrap_or_default();
        buffer.clear();
        buffer.resize(length, 0.0);
        self.outstanding += 1;
        Ok(buffer)
    }

    /// Returns a buffer back to the pool for reuse.
    pub fn release(&mut self, buffer: Vec<f32>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.buffers.len() < self.max_capacity {
            self.buffers.push(buffer);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_refuses_more_than_capacity() {
        let mut pool = BufferPool::with_capacity(2);
        let a = pool.checkout(4).unwrap();
        let _b = pool.checkout(4).unwrap();
        assert!(pool.checkout(4).is_err());
        pool.release(a);
        let c = pool.checkout(3).unwrap();
        assert_eq!(c, vec![0.0; 3]);
        assert_eq!(pool.outstanding(), 2);
    }
}
