//! Tags shared across the cache pipeline: tier levels, operations,
//! protection events, and breaker states.

/// Cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheLevel {
    /// Process-local near tier.
    L1Near,
    /// Shared far tier (networked key/value store).
    L2Far,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 2] = [CacheLevel::L1Near, CacheLevel::L2Far];

    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheLevel::L1Near => "l1_near",
            CacheLevel::L2Far => "l2_far",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            CacheLevel::L1Near => 0,
            CacheLevel::L2Far => 1,
        }
    }
}

impl std::fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Facade operation, used to bucket latency measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Put,
    Delete,
}

impl CacheOperation {
    pub const ALL: [CacheOperation; 3] = [
        CacheOperation::Get,
        CacheOperation::Put,
        CacheOperation::Delete,
    ];

    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Put => "put",
            CacheOperation::Delete => "delete",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            CacheOperation::Get => 0,
            CacheOperation::Put => 1,
            CacheOperation::Delete => 2,
        }
    }
}

impl std::fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Protection events surfaced through the metrics recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventType {
    /// A lookup was rejected by the membership filter.
    Penetration,
    /// Bulk-expiry risk flagged by an external monitor.
    AvalancheRisk,
    /// A hot key missed both tiers and entered single flight.
    Breakdown,
    /// The breaker short-circuited a data-source load.
    CircuitOpen,
}

impl CacheEventType {
    pub const ALL: [CacheEventType; 4] = [
        CacheEventType::Penetration,
        CacheEventType::AvalancheRisk,
        CacheEventType::Breakdown,
        CacheEventType::CircuitOpen,
    ];

    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheEventType::Penetration => "penetration",
            CacheEventType::AvalancheRisk => "avalanche_risk",
            CacheEventType::Breakdown => "breakdown",
            CacheEventType::CircuitOpen => "circuit_open",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            CacheEventType::Penetration => 0,
            CacheEventType::AvalancheRisk => 1,
            CacheEventType::Breakdown => 2,
            CacheEventType::CircuitOpen => 3,
        }
    }
}

impl std::fmt::Display for CacheEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls short-circuit to the fallback.
    Open,
    /// One probe call is in flight.
    HalfOpen,
}

impl CircuitState {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}
