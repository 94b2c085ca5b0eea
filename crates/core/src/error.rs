//! Error types for the hedging engine.
//!
//! Three families the caller must be able to tell apart: precondition
//! violations (the request was invalid, never retried), missing or inactive
//! entities, and collaborator failures (the feed or a venue could not
//! complete). Every failure is per-call; engine state is unchanged when an
//! error is returned.

use crate::types::{OptionId, PositionId, VenueId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Venue is not on the allow-list.
    #[error("unauthorized venue: {venue}")]
    UnauthorizedVenue {
        /// The venue that was rejected.
        venue: VenueId,
    },

    /// Requested size is zero or negative.
    #[error("invalid size: {size}")]
    InvalidSize {
        /// The rejected size.
        size: Decimal,
    },

    /// Leverage outside the allowed 1..=max range.
    #[error("invalid leverage: {leverage}, max {max}")]
    InvalidLeverage {
        /// The rejected leverage.
        leverage: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Slippage tolerance above the configured cap.
    #[error("invalid slippage: {slippage_bps} bps, cap {cap_bps} bps")]
    InvalidSlippage {
        /// The rejected tolerance.
        slippage_bps: u32,
        /// Configured cap.
        cap_bps: u32,
    },

    /// Strike offset above the configured cap.
    #[error("invalid strike offset: {offset_bps} bps, cap {cap_bps} bps")]
    InvalidStrikeOffset {
        /// The rejected offset.
        offset_bps: u32,
        /// Configured cap.
        cap_bps: u32,
    },

    /// Target delta outside the admin-settable range.
    #[error("invalid target delta: {target}, max magnitude {max}")]
    InvalidTargetDelta {
        /// The rejected target.
        target: Decimal,
        /// Maximum allowed magnitude.
        max: Decimal,
    },

    /// Implied volatility below the selling threshold.
    #[error("implied volatility below threshold: {current_bps} bps < {threshold_bps} bps")]
    IvBelowThreshold {
        /// Current venue IV.
        current_bps: u32,
        /// Configured minimum.
        threshold_bps: u32,
    },

    /// Portfolio vega has no headroom for a new written option.
    #[error("vega limit exceeded: current {current}, limit {limit}")]
    VegaLimitExceeded {
        /// Current portfolio vega exposure.
        current: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Perpetual position id unknown.
    #[error("position not found: {0}")]
    PositionNotFound(PositionId),

    /// Perpetual position already closed.
    #[error("position inactive: {0}")]
    PositionInactive(PositionId),

    /// Option position id unknown.
    #[error("option not found: {0}")]
    OptionNotFound(OptionId),

    /// Option position already resolved.
    #[error("option inactive: {0}")]
    OptionInactive(OptionId),

    /// Risk-increasing operation attempted while the emergency switch is on.
    #[error("emergency mode blocks {operation}")]
    EmergencyModeBlocked {
        /// The operation that was refused.
        operation: &'static str,
    },

    /// Price sample too old to trade on.
    #[error("stale price: {age_secs}s old, max {max_age_secs}s")]
    StalePrice {
        /// Sample age when checked.
        age_secs: i64,
        /// Configured maximum age.
        max_age_secs: i64,
    },

    /// Price sample confidence below the trade gate.
    #[error("low confidence price: {confidence_bps} bps < {min_bps} bps")]
    LowConfidence {
        /// Reported confidence.
        confidence_bps: u32,
        /// Configured minimum.
        min_bps: u32,
    },

    /// Venue reported a funding rate outside the sanity bound.
    #[error("invalid funding rate from {venue}: {rate}")]
    InvalidFundingRate {
        /// The reporting venue.
        venue: VenueId,
        /// The rejected rate.
        rate: Decimal,
    },

    /// A feed or venue call failed.
    #[error("venue call failed during {operation}: {source}")]
    VenueCall {
        /// The engine operation that was interrupted.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Creates an unauthorized venue error.
    pub fn unauthorized_venue(venue: impl Into<VenueId>) -> Self {
        Self::UnauthorizedVenue {
            venue: venue.into(),
        }
    }

    /// Creates an emergency-blocked error for the named operation.
    pub fn emergency_blocked(operation: &'static str) -> Self {
        Self::EmergencyModeBlocked { operation }
    }

    /// Wraps a failed feed or venue call.
    pub fn venue_call(operation: &'static str, source: anyhow::Error) -> Self {
        Self::VenueCall { operation, source }
    }

    /// True when the caller's request was invalid. Retrying without
    /// changing the request cannot succeed.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnauthorizedVenue { .. }
                | Self::InvalidSize { .. }
                | Self::InvalidLeverage { .. }
                | Self::InvalidSlippage { .. }
                | Self::InvalidStrikeOffset { .. }
                | Self::InvalidTargetDelta { .. }
                | Self::IvBelowThreshold { .. }
                | Self::VegaLimitExceeded { .. }
        )
    }

    /// True when an external collaborator could not complete. The request
    /// itself may be fine; the caller owns any retry policy.
    #[must_use]
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::StalePrice { .. }
                | Self::LowConfidence { .. }
                | Self::InvalidFundingRate { .. }
                | Self::VenueCall { .. }
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
