//! BudgetSync remote service adapters
//!
//! Network-facing implementations of the sync engine's seams:
//! - `HttpTransport`: the hosted sync API over HTTPS
//! - `ProbeConnectivityMonitor`: online/offline detection by TCP probe

pub mod http;
pub mod probe;

pub use http::{classify_status, HttpTransport, DEFAULT_REQUEST_TIMEOUT};
pub use probe::{probe, ProbeConfig, ProbeConnectivityMonitor};
