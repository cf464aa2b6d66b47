//! One acquisition run: glove and trigger recorders around a stimulus block.

use crate::config::Config;
use crate::error::{RecorderError, Result};
use crate::session::{GloveRecorder, Launcher, TriggerSync, WorkerReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

/// Per-run output directory, `<log_dir>/sub-XX/run-YY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    pub fn new(log_dir: impl AsRef<Path>, subject: u32, run: u32) -> Self {
        Self {
            dir: log_dir
                .as_ref()
                .join(format!("sub-{subject:02}"))
                .join(format!("run-{run:02}")),
        }
    }

    /// Create the run directory. An existing run is never overwritten.
    pub fn create(&self) -> std::io::Result<()> {
        if self.dir.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", self.dir.display()),
            ));
        }
        std::fs::create_dir_all(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn glove_log(&self) -> PathBuf {
        self.dir.join("glove.tsv")
    }

    pub fn trigger_log(&self) -> PathBuf {
        self.dir.join("TRs.tsv")
    }

    pub fn events_log(&self) -> PathBuf {
        self.dir.join("events.tsv")
    }
}

/// The recorders running for one run.
pub struct Acquisition {
    glove: Option<GloveRecorder>,
    trigger: Option<TriggerSync>,
    config: Config,
}

impl Acquisition {
    /// Start every enabled recorder and wait until each has its device open.
    ///
    /// If any recorder fails to come up, the ones already started are
    /// stopped before the error is returned.
    pub fn start(config: &Config, layout: &RunLayout, launcher: &Launcher) -> Result<Self> {
        let mut acquisition = Self {
            glove: None,
            trigger: None,
            config: config.clone(),
        };

        if config.glove.enabled {
            let mut glove = GloveRecorder::new(
                layout.glove_log(),
                config.glove.port.clone(),
                config.glove.channels.clone(),
                config.glove.backend.clone(),
                launcher.clone(),
            );
            glove.start()?;
            acquisition.glove = Some(glove);
        }

        if config.trigger.enabled {
            let mut trigger = TriggerSync::new(
                layout.trigger_log(),
                config.trigger.key.clone(),
                config.trigger.backend.clone(),
                launcher.clone(),
            );
            trigger.start()?;
            acquisition.trigger = Some(trigger);
        }

        if let Err(e) = acquisition.wait_ready() {
            acquisition.stop();
            return Err(e);
        }
        info!(dir = %layout.dir().display(), "recorders ready");
        Ok(acquisition)
    }

    fn wait_ready(&mut self) -> Result<()> {
        let timeout = self.config.ready_timeout;
        if let Some(glove) = self.glove.as_mut() {
            glove.wait_ready(timeout)?;
        }
        if let Some(trigger) = self.trigger.as_mut() {
            trigger.wait_ready(timeout)?;
        }
        Ok(())
    }

    /// Block until the scanner's first TR, honoring the configured timeout.
    ///
    /// Gives up with `Interrupted` as soon as `running` is cleared. Returns
    /// immediately when trigger recording is disabled.
    pub fn wait_for_first_tr(&mut self, running: &AtomicBool) -> Result<()> {
        let Some(trigger) = self.trigger.as_mut() else {
            return Ok(());
        };
        trigger.wait_until_first_tr_while(
            self.config.trigger.poll_interval,
            self.config.trigger.sync_timeout,
            running,
        )
    }

    /// Health check of the running recorders.
    pub fn check_alive(&mut self) -> Result<()> {
        if let Some(glove) = self.glove.as_mut() {
            glove.session_mut().check_alive()?;
        }
        if let Some(trigger) = self.trigger.as_mut() {
            trigger.session_mut().check_alive()?;
        }
        Ok(())
    }

    /// Stop the trigger listener, then the glove. Idempotent.
    pub fn stop(&mut self) {
        if let Some(trigger) = self.trigger.as_mut() {
            trigger.stop();
        }
        if let Some(glove) = self.glove.as_mut() {
            glove.stop();
        }
    }

    /// Reports left by workers that have exited.
    pub fn reports(&self) -> Vec<WorkerReport> {
        let glove = self.glove.as_ref().and_then(|g| g.session().report());
        let trigger = self.trigger.as_ref().and_then(|t| t.session().report());
        glove.into_iter().chain(trigger).collect()
    }

    /// First error any worker reported, after `stop`.
    pub fn failure(&self) -> Option<RecorderError> {
        let glove = self.glove.as_ref().and_then(|g| g.session().failure());
        glove.or_else(|| self.trigger.as_ref().and_then(|t| t.session().failure()))
    }

    pub fn trigger(&self) -> Option<&TriggerSync> {
        self.trigger.as_ref()
    }

    pub fn glove(&self) -> Option<&GloveRecorder> {
        self.glove.as_ref()
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.stop();
        for report in self.reports().iter().filter(|r| !r.succeeded()) {
            warn!("{}", report.summary());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_layout_paths() {
        let layout = RunLayout::new("/data/logs", 3, 12);
        assert_eq!(layout.dir(), Path::new("/data/logs/sub-03/run-12"));
        assert_eq!(
            layout.glove_log(),
            Path::new("/data/logs/sub-03/run-12/glove.tsv")
        );
        assert_eq!(
            layout.trigger_log(),
            Path::new("/data/logs/sub-03/run-12/TRs.tsv")
        );
        assert_eq!(
            layout.events_log(),
            Path::new("/data/logs/sub-03/run-12/events.tsv")
        );
    }

    #[test]
    fn test_existing_run_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), 1, 1);
        layout.create().unwrap();
        assert!(layout.dir().is_dir());

        let err = layout.create().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_nothing_enabled_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.glove.enabled = false;
        config.trigger.enabled = false;
        let layout = RunLayout::new(dir.path(), 1, 1);

        let mut acquisition =
            Acquisition::start(&config, &layout, &Launcher::new("labsync")).unwrap();
        acquisition.wait_for_first_tr(&AtomicBool::new(true)).unwrap();
        acquisition.check_alive().unwrap();
        acquisition.stop();
        assert!(acquisition.reports().is_empty());
        assert!(acquisition.failure().is_none());
    }
}
