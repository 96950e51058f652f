pub mod access_log;

#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub mod prometheus_exporter;

#[cfg(feature = "push")]
pub mod logger;
