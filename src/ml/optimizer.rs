// ============================================================
// Layer 5 - Optimizer Factory
// ============================================================
// Adam and SGD have different concrete types in Burn, so the
// chosen optimizer is handed to an OptimizerTask rather than
// returned. Both start at LEARNING_RATE; the StepLr scheduler
// supplies the rate for each step.
//
//   Adam: betas (0.9, 0.999), ε = 1e-8
//   SGD:  momentum 0.9, no dampening, no Nesterov

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, AdamConfig, Optimizer, SgdConfig},
    tensor::backend::AutodiffBackend,
};

use crate::domain::architecture::OptimizerKind;

/// Work to run with whichever optimizer the kind selects.
pub trait OptimizerTask<B: AutodiffBackend, M: AutodiffModule<B>> {
    type Output;

    fn run<O: Optimizer<M, B>>(self, optim: O) -> Result<Self::Output>;
}

/// Build the optimizer for `kind` over module type `M` and hand it to `task`.
pub fn with_optimizer<B, M, T>(kind: OptimizerKind, task: T) -> Result<T::Output>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    T: OptimizerTask<B, M>,
{
    tracing::info!("Optimizer: {} (lr={})", kind, OptimizerKind::LEARNING_RATE);

    match kind {
        OptimizerKind::Adam => {
            let optim = AdamConfig::new()
                .with_beta_1(0.9)
                .with_beta_2(0.999)
                .with_epsilon(1e-8)
                .init::<B, M>();
            task.run(optim)
        }
        OptimizerKind::Sgd => {
            let momentum = MomentumConfig {
                momentum:  OptimizerKind::SGD_MOMENTUM,
                dampening: 0.0,
                nesterov:  false,
            };
            let optim = SgdConfig::new()
                .with_momentum(Some(momentum))
                .init::<B, M>();
            task.run(optim)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};
    use burn::optim::GradientsParams;
    use burn::prelude::*;

    type TestBackend = Autodiff<NdArray>;

    /// Takes one step and reports how far the weights moved
    struct OneStep {
        model: Linear<TestBackend>,
    }

    impl OptimizerTask<TestBackend, Linear<TestBackend>> for OneStep {
        type Output = f32;

        fn run<O: Optimizer<Linear<TestBackend>, TestBackend>>(self, mut optim: O) -> Result<f32> {
            let device = Default::default();
            let before: Vec<f32> = self.model.weight.val().into_data().iter::<f32>().collect();

            let loss  = self.model.forward(Tensor::<TestBackend, 2>::ones([1, 2], &device)).sum();
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            let model = optim.step(OptimizerKind::LEARNING_RATE, self.model, grads);

            let after: Vec<f32> = model.weight.val().into_data().iter::<f32>().collect();
            Ok(before.iter().zip(&after).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max))
        }
    }

    /// Two steps on a loss with a constant gradient; returns the
    /// displacement of the first weight at each step
    struct TwoSteps {
        model: Linear<TestBackend>,
    }

    impl OptimizerTask<TestBackend, Linear<TestBackend>> for TwoSteps {
        type Output = (f32, f32);

        fn run<O: Optimizer<Linear<TestBackend>, TestBackend>>(self, mut optim: O) -> Result<(f32, f32)> {
            let device = Default::default();
            let first_weight = |m: &Linear<TestBackend>| m.weight.val().into_data().iter::<f32>().next().unwrap();

            let mut model = self.model;
            let mut moves = Vec::new();
            for _ in 0..2 {
                let before = first_weight(&model);
                let loss   = model.forward(Tensor::<TestBackend, 2>::ones([1, 2], &device)).sum();
                let grads  = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(OptimizerKind::LEARNING_RATE, model, grads);
                moves.push(before - first_weight(&model));
            }
            Ok((moves[0], moves[1]))
        }
    }

    #[test]
    fn sgd_momentum_carries_into_the_second_step() {
        let model = LinearConfig::new(2, 1).init::<TestBackend>(&Default::default());
        let (first, second) = with_optimizer(OptimizerKind::Sgd, TwoSteps { model }).unwrap();

        // v1 = g, v2 = 0.9·v1 + g, so step two moves 1.9× as far
        assert!((first as f64 - OptimizerKind::LEARNING_RATE).abs() < 1e-6);
        assert!(((second / first) as f64 - (1.0 + OptimizerKind::SGD_MOMENTUM)).abs() < 1e-3);
    }

    #[test]
    fn both_kinds_update_parameters() {
        let model = LinearConfig::new(2, 1).init::<TestBackend>(&Default::default());

        for kind in [OptimizerKind::Adam, OptimizerKind::Sgd] {
            let moved = with_optimizer(kind, OneStep { model: model.clone() }).unwrap();
            assert!(moved > 0.0, "{kind} did not move the weights");
        }
    }

    #[test]
    fn adam_first_step_is_about_the_learning_rate() {
        let model = LinearConfig::new(2, 1).init::<TestBackend>(&Default::default());
        let moved = with_optimizer(OptimizerKind::Adam, OneStep { model }).unwrap();
        assert!((moved as f64 - OptimizerKind::LEARNING_RATE).abs() < 1e-4);
    }
}
