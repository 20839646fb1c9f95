//! Run settings shared by the extractor and the accumulator.

use std::path::Path;

/// What to do when a raster cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreadablePolicy {
    #[default]
    Abort,
    /// Leave the raster out and list it in the outcome
    SkipAndReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Spread independent work over the rayon pool
    Parallel,
}

/// Reported after each unit of work
#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub path: &'a Path,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&Progress<'_>) + Sync);

#[derive(Clone, Copy, Default)]
pub struct RunOptions<'a> {
    pub on_unreadable: UnreadablePolicy,
    pub mode: ExecutionMode,
    pub progress: Option<ProgressFn<'a>>,
}

impl<'a> RunOptions<'a> {
    pub(crate) fn report(&self, completed: usize, total: usize, path: &Path) {
        if let Some(progress) = self.progress {
            progress(&Progress {
                completed,
                total,
                path,
            });
        }
    }
}
