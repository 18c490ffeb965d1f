pub mod guard_repository;
pub mod kpi_repository;

pub use guard_repository::PostgresExportGuardRepository;
pub use kpi_repository::PostgresKpiRepository;
