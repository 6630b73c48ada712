//! Domain layer for the broker.
//!
//! Pure data types with no I/O:
//!
//! - **`config`** – [`BrokerConfig`](config::BrokerConfig) and its sections, and
//!   the [`PortPool`](config::PortPool) public ports are drawn from.
//! - **`session`** – what a bridge session is and which states it moves through.
//! - **`url`** – composition of the viewer URL handed back to the caller.

pub mod config;
pub mod session;
pub mod url;
