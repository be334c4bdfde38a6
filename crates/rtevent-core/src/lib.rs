//! # rtevent-core
//!
//! Platform-agnostic types shared by the timer, async-handler, and idle-callback
//! core: identifiers, error taxonomy, the interpreter cancellation/limit token,
//! environment-variable configuration helpers, and the logging macros.
//!
//! All platform-specific implementation (clocks, signal plumbing, the scheduler
//! threads) lives in `rtevent-runtime`.
//!
//! ## Modules
//!
//! - `ids` - token/handle/id newtypes for timers, async handlers, and after-records
//! - `error` - `EventError` / `EventResult` and the error-code tag strings
//! - `limit` - cooperative cancellation and wall-clock resource limit checking
//! - `logging` - env-gated debug print macros
//! - `env` - environment variable parsing helpers

#![allow(dead_code)]

pub mod env;
pub mod error;
pub mod ids;
pub mod limit;
pub mod logging;

pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use error::{EventError, EventResult};
pub use ids::{AfterId, AsyncHandle, TimerToken};
pub use limit::LimitToken;
