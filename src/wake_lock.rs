//! Screen wake lock
//!
//! Keeps the display on while a cooking session is open. The lock is
//! advisory: failing to acquire it only changes what the UI shows.

/// Wake lock errors
#[derive(Debug, thiserror::Error)]
pub enum WakeLockError {
    #[error("Wake lock not supported on this platform")]
    Unsupported,

    #[error("Wake lock request denied: {0}")]
    Denied(String),
}

/// Host screen wake lock capability
pub trait WakeLock: Send {
    fn request(&mut self) -> Result<(), WakeLockError>;
    fn release(&mut self);
}

/// Holds a wake lock for as long as it lives
pub struct WakeLockGuard {
    lock: Option<Box<dyn WakeLock>>,
    active: bool,
}

impl WakeLockGuard {
    /// Try to acquire `lock`. Failure is logged and leaves the guard inactive.
    pub fn acquire(lock: Option<Box<dyn WakeLock>>) -> Self {
        let Some(mut lock) = lock else {
            tracing::debug!("No wake lock available");
            return Self::inactive();
        };

        match lock.request() {
            Ok(()) => {
                tracing::info!("Screen wake lock acquired");
                Self {
                    lock: Some(lock),
                    active: true,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to acquire screen wake lock: {}", e);
                Self::inactive()
            }
        }
    }

    pub fn inactive() -> Self {
        Self {
            lock: None,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Release the lock early. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            lock.release();
            tracing::info!("Screen wake lock released");
        }
        self.active = false;
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
