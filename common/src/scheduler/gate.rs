// Admission gate bounding concurrent executions

use crate::errors::ExecutionError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Fixed pool of execution permits
///
/// Acquisition never waits: when every permit is taken the caller is
/// rejected and the firing is dropped.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Permit held for the lifetime of one execution
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a permit without waiting
    pub fn try_admit(&self) -> Result<AdmissionPermit, ExecutionError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                Err(ExecutionError::ConcurrencyLimitReached {
                    limit: self.capacity,
                })
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_when_exhausted() {
        let gate = AdmissionGate::new(2);
        let first = gate.try_admit().unwrap();
        let _second = gate.try_admit().unwrap();

        assert_eq!(gate.in_use(), 2);
        assert_eq!(
            gate.try_admit().unwrap_err(),
            ExecutionError::ConcurrencyLimitReached { limit: 2 }
        );

        drop(first);
        assert_eq!(gate.available(), 1);
        assert!(gate.try_admit().is_ok());
    }

    #[test]
    fn test_zero_capacity_admits_nothing() {
        let gate = AdmissionGate::new(0);
        assert!(gate.try_admit().is_err());
    }
}
