//! Demo services bundled with the server.
//!
//! - [`CalculatorService`]: `calculator.*`, one operation per call shape plus square root
//! - [`GreetService`]: `greet.*`, the same shapes over greetings, plus a deadline-aware unary

pub mod calculator;
pub mod greet;

pub use calculator::{CalculatorService, EmitPolicy, PrimeFactors, RunningAverage, RunningMaximum};
pub use greet::GreetService;

use crate::config::ServerConfig;
use crate::dispatch::HandlerRegistry;

/// Registry with both demo services registered according to `config`.
pub fn default_registry(config: &ServerConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    CalculatorService::new(config.emit_policy).register(&mut registry);
    GreetService::new(config.greet_step).register(&mut registry);
    registry
}
