//! Optional capability facets layered onto a node.
//!
//! Each facet is independently present or absent. Most are descriptive (the
//! engine renders them but never enforces them); the circuit breaker and the
//! approval state are also mutated transiently while a run is in flight.

use serde::{Deserialize, Serialize};

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Linear,
    Exponential,
    Jitter,
}

/// A configured retry policy.
///
/// The simulation never retries; the policy is rendered as a badge and as the
/// delay schedule returned by [`RetryConfig::delays`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds.
    pub delay: u64,
    /// How the delay grows between attempts.
    pub backoff: Backoff,
}

/// The delay before one retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryDelay {
    /// A fixed delay in milliseconds.
    Fixed { ms: u64 },
    /// A randomized delay in `[min_ms, max_ms]`.
    Window { min_ms: u64, max_ms: u64 },
}

impl RetryConfig {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(max_retries: u32, delay: u64, backoff: Backoff) -> Self {
        Self {
            max_retries,
            delay,
            backoff,
        }
    }

    /// Returns the delay schedule for every retry attempt, in order.
    ///
    /// Exponential delays saturate instead of overflowing.
    #[must_use]
    pub fn delays(&self) -> Vec<RetryDelay> {
        (0..self.max_retries)
            .map(|attempt| match self.backoff {
                Backoff::Linear => RetryDelay::Fixed {
                    ms: self.delay.saturating_mul(u64::from(attempt) + 1),
                },
                Backoff::Exponential => RetryDelay::Fixed {
                    ms: self.exponential(attempt),
                },
                Backoff::Jitter => RetryDelay::Window {
                    min_ms: self.delay,
                    max_ms: self.exponential(attempt),
                },
            })
            .collect()
    }

    fn exponential(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt)
            .and_then(|factor| self.delay.checked_mul(factor))
            .unwrap_or(u64::MAX)
    }
}

/// Circuit breaker position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerStatus {
    #[default]
    Closed,
    HalfOpen,
    Open,
}

/// A three-state failure indicator.
///
/// `failures <= threshold` is not enforced; the demo data never exceeds it and
/// the simulation only pulses `status` without touching `failures`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub status: BreakerStatus,
    pub failures: u32,
    pub threshold: u32,
}

impl CircuitBreaker {
    /// Creates a closed breaker with no recorded failures.
    #[must_use]
    pub const fn closed(threshold: u32) -> Self {
        Self {
            status: BreakerStatus::Closed,
            failures: 0,
            threshold,
        }
    }

    /// Returns true if the failure count has reached the threshold.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.failures >= self.threshold
    }
}

/// Human-in-the-loop decision state of an approval node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    #[default]
    Waiting,
    Approved,
    Rejected,
}

/// One step of an agent's reasoning narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step: u32,
    pub thought: String,
    pub action: String,
    pub result: String,
}

impl ReasoningStep {
    #[must_use]
    pub fn new(
        step: u32,
        thought: impl Into<String>,
        action: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            step,
            thought: thought.into(),
            action: action.into(),
            result: result.into(),
        }
    }
}

/// Authoring state of a node's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftState {
    Draft,
    Review,
    Published,
}

/// Kind of memory an AI node keeps between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Buffer,
    Summary,
    Vector,
    Entity,
}

/// What a higher execution layer should do when the node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDirective {
    Retry,
    Fallback,
    Skip,
    Escalate,
}
