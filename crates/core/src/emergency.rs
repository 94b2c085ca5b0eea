//! Shared emergency switch.
//!
//! One flag per engine instance, shared by the managers and the risk
//! controller. While engaged, risk-increasing operations are refused and
//! only closes may run. The switch is a state flag, not a control-flow
//! interrupt: in-flight operations complete, the next call is refused.

use crate::error::{EngineError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EmergencySwitch {
    engaged: Arc<AtomicBool>,
}

impl EmergencySwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        self.engaged.store(true, Ordering::SeqCst);
    }

    /// Manual reset path. Emergency is sticky until this is called.
    pub fn release(&self) {
        self.engaged.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Gate for risk-increasing operations.
    ///
    /// # Errors
    ///
    /// Returns `EmergencyModeBlocked` naming `operation` while engaged.
    pub fn guard(&self, operation: &'static str) -> Result<()> {
        if self.is_engaged() {
            return Err(EngineError::emergency_blocked(operation));
        }
        Ok(())
    }
}
