use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Concrete breaker type so the scoring client can hold it in a field.
pub type OracleCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for the AI scoring oracle.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast and scoring falls back
///   to the deterministic path.
/// - **HALF_OPEN**: Testing if the oracle recovered.
pub fn create_oracle_circuit_breaker() -> OracleCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
