//! Global progress bar registry, shared without threading a handle through
//! the scoring code.

use indicatif::{MultiProgress, ProgressBar};
use once_cell::sync::Lazy;
use std::sync::Arc;

static MULTI: Lazy<Arc<MultiProgress>> = Lazy::new(|| Arc::new(MultiProgress::new()));

pub fn global_mp() -> Arc<MultiProgress> {
    MULTI.clone()
}

pub fn add_progress_bar(pb: ProgressBar) {
    global_mp().add(pb);
}

/// Finish a bar and detach it so later log lines print cleanly
pub fn finish_progress_bar(pb: &ProgressBar) {
    pb.finish_and_clear();
    global_mp().remove(pb);
}
