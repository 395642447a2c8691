use std::time::Duration;

use rand::Rng;

/// Spacing between sends in a batch run. Not a correctness backoff, just
/// enough variance to stay under provider spam heuristics: 30s per send,
/// doubling after the first 25 sends in a run, with +/-20% jitter.
#[derive(Debug, Clone)]
pub struct Pacer {
    base: Duration,
    slow: Duration,
    escalate_after: usize,
    jitter: f64,
}

impl Default for Pacer {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            slow: Duration::from_secs(60),
            escalate_after: 25,
            jitter: 0.2,
        }
    }
}

impl Pacer {
    #[cfg(test)]
    pub fn with_timing(base: Duration, slow: Duration, escalate_after: usize) -> Self {
        Self {
            base,
            slow,
            escalate_after,
            jitter: 0.2,
        }
    }

    /// Delay before the next send, given how many have gone out this run.
    pub fn delay_after(&self, sent: usize) -> Duration {
        let tier = if sent < self.escalate_after {
            self.base
        } else {
            self.slow
        };
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        tier.mul_f64(factor)
    }

    /// Blocking wait between sends.
    pub fn pause_after(&self, sent: usize) {
        std::thread::sleep(self.delay_after(sent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_tiers_and_jitter_bounds() {
        let pacer = Pacer::with_timing(Duration::from_secs(30), Duration::from_secs(60), 25);
        for _ in 0..50 {
            let early = pacer.delay_after(0);
            assert!(early >= Duration::from_secs(24), "got {:?}", early);
            assert!(early <= Duration::from_secs(36), "got {:?}", early);

            let late = pacer.delay_after(25);
            assert!(late >= Duration::from_secs(48), "got {:?}", late);
            assert!(late <= Duration::from_secs(72), "got {:?}", late);
        }
    }

    #[test]
    fn test_escalation_boundary() {
        let pacer = Pacer::with_timing(Duration::from_secs(10), Duration::from_secs(20), 3);
        // Sends 0,1,2 pace at base; from the 3rd onward at slow
        assert!(pacer.delay_after(2) <= Duration::from_secs(12));
        assert!(pacer.delay_after(3) >= Duration::from_secs(16));
    }
}
