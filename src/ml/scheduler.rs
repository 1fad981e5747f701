// ============================================================
// Layer 5 - StepLR Schedule
// ============================================================
// Decays the learning rate by `gamma` every `step_size` epochs:
//
//   lr(e) = base_lr × gamma^⌊e / step_size⌋
//
// The trainer calls step() once per epoch, after the train phase.

/// Epochs between decays
pub const DEFAULT_STEP_SIZE: usize = 5;
/// Multiplicative decay per step
pub const DEFAULT_GAMMA: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct StepLr {
    base_lr:   f64,
    step_size: usize,
    gamma:     f64,
    steps:     usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            steps: 0,
        }
    }

    /// Step size 5, gamma 0.1
    pub fn with_defaults(base_lr: f64) -> Self {
        Self::new(base_lr, DEFAULT_STEP_SIZE, DEFAULT_GAMMA)
    }

    pub fn current_lr(&self) -> f64 {
        let decays = (self.steps / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }

    /// Advance one epoch and return the new rate.
    pub fn step(&mut self) -> f64 {
        self.steps += 1;
        let lr = self.current_lr();
        if self.steps % self.step_size == 0 {
            tracing::info!("Learning rate decayed to {:e}", lr);
        }
        lr
    }

    /// Epochs stepped so far
    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-15
    }

    #[test]
    fn decays_every_five_epochs() {
        let mut lr = StepLr::with_defaults(1e-3);
        let mut rates = vec![lr.current_lr()];
        for _ in 0..12 {
            rates.push(lr.step());
        }

        assert!(rates[..5].iter().all(|&r| close(r, 1e-3)));
        assert!(rates[5..10].iter().all(|&r| close(r, 1e-4)));
        assert!(rates[10..].iter().all(|&r| close(r, 1e-5)));
        assert_eq!(lr.steps(), 12);
    }

    #[test]
    fn zero_step_size_is_treated_as_one() {
        let mut lr = StepLr::new(1.0, 0, 0.5);
        assert_eq!(lr.step(), 0.5);
        assert_eq!(lr.step(), 0.25);
    }
}
