use crate::error::{PfileError, PfileResult};
use std::fmt;

pub const INITIAL_CAPACITY: usize = 64 * 1024;

/// Output buffer for one serialized record. Capacity doubles whenever a
/// write would overflow it; a failed reservation poisons the buffer.
#[derive(Debug)]
pub struct RecordBuffer {
    bytes: Vec<u8>,
    failed_at: Option<usize>,
}

impl RecordBuffer {
    pub fn with_capacity(capacity: usize) -> PfileResult<Self> {
        let capacity = capacity.max(1);
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| PfileError::BufferAllocation {
                requested: capacity,
            })?;
        Ok(Self {
            bytes,
            failed_at: None,
        })
    }

    pub fn push_str(&mut self, text: &str) -> PfileResult<()> {
        if let Some(requested) = self.failed_at {
            return Err(PfileError::BufferAllocation { requested });
        }
        let needed = self.bytes.len() + text.len();
        if needed > self.bytes.capacity() {
            let target = grown_capacity(self.bytes.capacity(), needed);
            if self
                .bytes
                .try_reserve_exact(target - self.bytes.len())
                .is_err()
            {
                self.failed_at = Some(target);
                return Err(PfileError::BufferAllocation { requested: target });
            }
        }
        self.bytes.extend_from_slice(text.as_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hands back the bytes, or the allocation failure that poisoned the buffer.
    pub fn finish(self) -> PfileResult<Vec<u8>> {
        match self.failed_at {
            Some(requested) => Err(PfileError::BufferAllocation { requested }),
            None => Ok(self.bytes),
        }
    }

    pub fn failure(&self) -> Option<PfileError> {
        self.failed_at
            .map(|requested| PfileError::BufferAllocation { requested })
    }
}

fn grown_capacity(current: usize, needed: usize) -> usize {
    let mut target = current.max(1);
    while target < needed {
        target = match target.checked_mul(2) {
            Some(doubled) => doubled,
            None => return needed,
        };
    }
    target
}

impl fmt::Write for RecordBuffer {
    fn write_str(&mut self, text: &str) -> fmt::Result {
        self.push_str(text).map_err(|_| fmt::Error)
    }
}
