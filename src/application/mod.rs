// Export pipeline and its scheduler
pub mod export;
