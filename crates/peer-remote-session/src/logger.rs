//! Interaction logger: records send-path events during an experiment window
//! and exports them as CSV.

use std::path::PathBuf;

use peer_remote_core::ExperimentConfig;

use crate::storage::{CsvExporter, ExportError, InteractionLog, InteractionLogEntry};

/// Recording gate plus export.
#[derive(Debug)]
pub struct InteractionLogger {
    log: InteractionLog,
    exporter: CsvExporter,
    experiment: ExperimentConfig,
}

impl InteractionLogger {
    #[must_use]
    pub fn new(exporter: CsvExporter) -> Self {
        Self {
            log: InteractionLog::new(),
            exporter,
            experiment: ExperimentConfig::default(),
        }
    }

    #[must_use]
    pub const fn experiment(&self) -> &ExperimentConfig {
        &self.experiment
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.log.is_recording()
    }

    #[must_use]
    pub fn entries(&self) -> &[InteractionLogEntry] {
        self.log.entries()
    }

    /// Record the mode without touching the recording window.
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.experiment.mode = mode.into();
    }

    /// Switch the experiment window.
    ///
    /// Enabling clears the buffer and starts recording. Disabling stops
    /// recording, exports what was buffered and clears it on success; a
    /// failed export keeps the buffer so it can be retried with
    /// [`export_logs`](Self::export_logs).
    ///
    /// # Errors
    /// Returns error if the export on disable fails.
    pub async fn set_experiment_mode(
        &mut self,
        enabled: bool,
        mode: impl Into<String>,
    ) -> Result<Option<PathBuf>, ExportError> {
        self.experiment = ExperimentConfig::new(enabled, mode);
        if enabled {
            self.log.start();
            tracing::info!(mode = %self.experiment.mode, "Experiment recording started");
            return Ok(None);
        }

        self.log.stop();
        let exported = self.export_logs().await?;
        self.log.clear();
        tracing::info!(mode = %self.experiment.mode, "Experiment recording stopped");
        Ok(exported)
    }

    /// Append an entry. No-op outside the experiment window.
    pub fn log_interaction(&mut self, kind: impl Into<String>, details: impl Into<String>) {
        self.log.record(kind, details);
    }

    /// Write the buffer to a fresh CSV file. The buffer is left as is.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn export_logs(&self) -> Result<Option<PathBuf>, ExportError> {
        self.exporter.export(self.log.entries()).await.inspect_err(|e| {
            tracing::error!(entries = self.log.len(), "Interaction export failed: {e}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(dir: &std::path::Path) -> InteractionLogger {
        InteractionLogger::new(CsvExporter::new(dir, "Pad"))
    }

    #[tokio::test]
    async fn test_disabled_logs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());
        for _ in 0..5 {
            logger.log_interaction("webHoverTap", "");
        }
        assert!(logger.entries().is_empty());
        assert_eq!(logger.export_logs().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_exports_then_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());
        logger.set_experiment_mode(true, "gazePinch").await.unwrap();
        logger.log_interaction("webScroll", "dx=20,dy=0");
        logger.log_interaction("webTap", "nx=0.5,ny=0.5");

        let path = logger
            .set_experiment_mode(false, "gazePinch")
            .await
            .unwrap()
            .unwrap();
        assert!(logger.entries().is_empty());
        assert!(!logger.is_recording());
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let mut logger = logger(&blocker);
        logger.set_experiment_mode(true, "directTouch").await.unwrap();
        logger.log_interaction("WEB_NAV", "BACK");

        assert!(logger.set_experiment_mode(false, "directTouch").await.is_err());
        assert_eq!(logger.entries().len(), 1);
        assert!(!logger.is_recording());
        assert!(!logger.experiment().enabled);
    }

    #[tokio::test]
    async fn test_restart_clears_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());
        logger.set_experiment_mode(true, "a").await.unwrap();
        logger.log_interaction("x", "1");
        logger.set_experiment_mode(true, "b").await.unwrap();
        assert!(logger.entries().is_empty());
        assert_eq!(logger.experiment().mode, "b");
    }
}
