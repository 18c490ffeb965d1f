pub mod pipeline;
pub mod scheduler;

pub use pipeline::{ExportPipeline, ExportReport, ExportTrigger};
pub use scheduler::{ExportScheduler, ExportState};
