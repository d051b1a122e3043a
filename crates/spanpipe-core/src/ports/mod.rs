//! Port traits implemented by sink crates and third-party backends

pub mod analytics;
pub mod exporter;

pub use analytics::AnalyticsAdapter;
pub use exporter::SpanExporter;
