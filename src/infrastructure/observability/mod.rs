//! Push-based observability for the exporter
//!
//! Everything here is outbound: KPI payloads are pushed to the metrics sink
//! as InfluxDB line protocol, and the exporter's own counters are kept in a
//! Prometheus registry that is rendered into the log. No HTTP server.

pub mod influx_sink;
pub mod line_protocol;
pub mod metrics;

pub use influx_sink::{InfluxSink, StdoutSink};
pub use line_protocol::LineProtocolEncoder;
pub use metrics::ExporterMetrics;
