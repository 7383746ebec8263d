//! # rrredir-targets
//!
//! Redirect targets for the round-robin port redirector.
//!
//! A target is an upstream endpoint written as `host:port`, optionally
//! followed by `@bindhost` to pin the local address of the outbound socket.
//! Targets are parsed and resolved once at startup into a [`TargetTable`],
//! which is never mutated afterwards and can be shared freely between
//! connection workers.
//!
//! ## Examples
//!
//! - `10.0.0.1:80`
//! - `backend.internal:8080@192.168.1.10`
//! - `[2001:db8::1]:443@[2001:db8::100]`

mod error;
mod resolve;
mod spec;
mod table;

pub use error::TargetError;
pub use resolve::{resolve, resolve_bind_address};
pub use spec::TargetSpec;
pub use table::{AddressFamily, Target, TargetTable};
