//! Resilience primitives shared by the hive daemons: cooperative shutdown,
//! a circuit breaker for the fast-fix path, bounded backoff for collaborator
//! calls, and the adaptive timeout policy used around dispatches and
//! validator subprocesses.

pub mod circuit_breaker;
pub mod retry;
pub mod shutdown;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
pub use shutdown::ShutdownSignal;
pub use timeout::{AdaptiveTimeout, TimeoutConfig};
