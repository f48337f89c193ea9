use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use datagen_common::config::AppConfig;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{DatagenError, DatagenResult};

/// The stages of a run. A run only moves forward, one stage at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunStage {
    Empty,
    DimensionGenerated,
    FactGenerated,
    UnsortedWritten,
    SortedWritten,
    Verified,
}

impl RunStage {
    pub fn next(&self) -> Option<RunStage> {
        match self {
            RunStage::Empty => Some(RunStage::DimensionGenerated),
            RunStage::DimensionGenerated => Some(RunStage::FactGenerated),
            RunStage::FactGenerated => Some(RunStage::UnsortedWritten),
            RunStage::UnsortedWritten => Some(RunStage::SortedWritten),
            RunStage::SortedWritten => Some(RunStage::Verified),
            RunStage::Verified => None,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Empty => "EMPTY",
            RunStage::DimensionGenerated => "DIMENSION_GENERATED",
            RunStage::FactGenerated => "FACT_GENERATED",
            RunStage::UnsortedWritten => "UNSORTED_WRITTEN",
            RunStage::SortedWritten => "SORTED_WRITTEN",
            RunStage::Verified => "VERIFIED",
        };
        write!(f, "{name}")
    }
}

/// Exclusive ownership of an output root, held through a lock file next to it.
///
/// The lock file cannot live inside the root since the root is wiped at the
/// start of every run.
#[derive(Debug)]
pub struct RunLock {
    path: Option<PathBuf>,
}

impl RunLock {
    pub fn acquire(root: &Path) -> DatagenResult<Self> {
        let path = Self::lock_path(root);
        if let Some(parent) = path.parent().filter(|x| !x.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DatagenError::io(parent, e))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(x) => x,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DatagenError::ConcurrentRunConflict(path));
            }
            Err(e) => return Err(DatagenError::io(&path, e)),
        };
        writeln!(file, "{}", std::process::id()).map_err(|e| DatagenError::io(&path, e))?;
        debug!("acquired lock {}", path.display());
        Ok(Self { path: Some(path) })
    }

    pub fn lock_path(root: &Path) -> PathBuf {
        // Normalize away trailing separators so that the lock file is a sibling of the root.
        let root = root.components().collect::<PathBuf>();
        let mut name = OsString::from(root.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn release(mut self) -> DatagenResult<()> {
        match self.path.take() {
            Some(path) => fs::remove_file(&path).map_err(|e| DatagenError::io(&path, e)),
            None => Ok(()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to remove lock {}: {e}", path.display());
            }
        }
    }
}

/// The explicit execution context of a run, passed to every stage.
///
/// Creating the context takes ownership of the output root and clears any
/// previous output. Releasing the context gives up the ownership.
#[derive(Debug)]
pub struct RunContext {
    config: AppConfig,
    reference_time: DateTime<Local>,
    rng: StdRng,
    stage: RunStage,
    lock: RunLock,
}

impl RunContext {
    pub fn create(config: AppConfig, reference_time: DateTime<Local>) -> DatagenResult<Self> {
        config.validate()?;
        let root = config.output.root.clone();
        let lock = RunLock::acquire(&root)?;
        reset_output_root(&root)?;
        let rng = match config.generation.seed {
            Some(seed) => {
                info!("Using random seed {seed}");
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            config,
            reference_time,
            rng,
            stage: RunStage::Empty,
            lock,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.output.root
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_time.date_naive()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    /// Moves the run to the given stage, which must directly follow the current one.
    pub fn advance(&mut self, stage: RunStage) -> DatagenResult<()> {
        if self.stage.next() != Some(stage) {
            return Err(DatagenError::internal(format!(
                "invalid stage transition from {} to {stage}",
                self.stage
            )));
        }
        debug!("run stage: {} -> {stage}", self.stage);
        self.stage = stage;
        Ok(())
    }

    pub fn release(self) -> DatagenResult<()> {
        self.lock.release()
    }
}

fn reset_output_root(root: &Path) -> DatagenResult<()> {
    if root.exists() {
        info!("Removing previous output in {}", root.display());
        fs::remove_dir_all(root).map_err(|e| DatagenError::io(root, e))?;
    }
    fs::create_dir_all(root).map_err(|e| DatagenError::io(root, e))
}
