//! Host-facing contract, router and stdio bridge for native shells.

pub mod channel;
pub mod contract;
pub mod proxies;
pub mod stdio;
