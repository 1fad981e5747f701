// ============================================================
// Layer 3 - Best State Tracking
// ============================================================
// Keeps the parameters of the epoch with the highest validation
// accuracy seen so far.
//
// Lifecycle:
//   new()       - seeded with the model's starting parameters, accuracy 0.0
//   observe()   - called once per epoch after the validate phase;
//                 replaces the snapshot only on STRICT improvement
//   into_state()- hands the snapshot back so it can be loaded into
//                 the model at the very end of training
//
// The snapshot is an owned value. Callers produce it lazily
// (only when an improvement actually happens) and nothing else
// holds a reference to it, so later training cannot mutate it.

/// Immutable snapshot of the best evaluated state.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSnapshot<S> {
    /// Epoch the snapshot was taken at (0 = before training)
    pub epoch:    usize,
    /// Validation accuracy of that epoch
    pub accuracy: f64,
    pub state:    S,
}

/// Tracks the best validation-accuracy snapshot across epochs.
#[derive(Debug)]
pub struct BestTracker<S> {
    best: BestSnapshot<S>,
}

impl<S> BestTracker<S> {
    /// Start from the initial parameters with a best accuracy of zero.
    pub fn new(initial: S) -> Self {
        Self {
            best: BestSnapshot { epoch: 0, accuracy: 0.0, state: initial },
        }
    }

    /// Offer an epoch's validation accuracy.
    /// `snapshot` is only invoked when `accuracy` strictly exceeds the best so far.
    /// Returns whether the snapshot was replaced.
    pub fn observe<F>(&mut self, epoch: usize, accuracy: f64, snapshot: F) -> bool
    where
        F: FnOnce() -> S,
    {
        if accuracy > self.best.accuracy {
            self.best = BestSnapshot { epoch, accuracy, state: snapshot() };
            true
        } else {
            false
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.best.accuracy
    }

    pub fn epoch(&self) -> usize {
        self.best.epoch
    }

    /// Consume the tracker and return the best snapshot.
    pub fn into_snapshot(self) -> BestSnapshot<S> {
        self.best
    }
}
