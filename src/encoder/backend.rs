use crate::media::MediaUnit;
use crate::session::SessionConfig;
use anyhow::Result;
use std::path::PathBuf;

/// Media encoder trait
///
/// Driven by a single consumer task: `open` once, `write` for every unit in
/// delivery order, then `finalize` exactly once. A session that ends
/// without recording anything calls `abort` instead of `finalize`.
#[async_trait::async_trait]
pub trait MediaEncoder: Send {
    /// Prepare the output for writing
    async fn open(&mut self, config: &SessionConfig) -> Result<()>;

    /// Encode one unit; takes ownership of it
    async fn write(&mut self, unit: MediaUnit) -> Result<()>;

    /// Complete the output and return the files produced
    async fn finalize(&mut self) -> Result<Vec<PathBuf>>;

    /// Drop a partial output without producing files
    async fn abort(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get encoder name for logging
    fn name(&self) -> &str;
}
