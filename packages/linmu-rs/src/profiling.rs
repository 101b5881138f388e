use std::time::{Duration, Instant};

/// Logs how long a pipeline stage took when dropped
pub struct StageTimer {
    label: String,
    start: Instant,
}

impl StageTimer {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        log::debug!("[STAGE] {} started", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        log::info!(
            "[STAGE] {} - {:.3}ms",
            self.label,
            self.start.elapsed().as_secs_f64() * 1000.0
        );
    }
}

/// Time the rest of the enclosing scope
#[macro_export]
macro_rules! stage_timer {
    ($label:expr) => {
        let _stage_timer = $crate::profiling::StageTimer::new($label);
    };
}
