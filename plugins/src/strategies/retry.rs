use std::time::Duration;

use taskweave_core::orchestrator::BackoffStrategy;

/// `step * retry`, capped at `max`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step_ms: u64,
    max_ms: u64,
}

/// Same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl LinearBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            step_ms: u64::try_from(step.as_millis()).unwrap_or(u64::MAX),
            max_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn name(&self) -> &str {
        "linear"
    }

    fn delay(&self, retry: u32) -> Duration {
        let delay = self.step_ms.saturating_mul(u64::from(retry.max(1)));
        Duration::from_millis(delay.min(self.max_ms))
    }
}

impl BackoffStrategy for FixedDelay {
    fn name(&self) -> &str {
        "fixed"
    }

    fn delay(&self, _retry: u32) -> Duration {
        self.delay
    }
}

/// Resolves a strategy by name; `None` for unknown names.
pub fn by_name(name: &str, unit: Duration, max: Duration) -> Option<Box<dyn BackoffStrategy>> {
    match name {
        "linear" => Some(Box::new(LinearBackoff::new(unit, max))),
        "fixed" => Some(Box::new(FixedDelay::new(unit))),
        _ => None,
    }
}
