//! Elman recurrent network on `ndarray`.
//!
//! `h_t = tanh(w_x * x_t + W_h h_{t-1} + b_h)`, output `y = W_o h_T + b_o`.
//! Trained with full backpropagation through time, global-norm gradient
//! clipping and Adam, minimizing mean squared error.

use crate::domain::ml::model::ModelTopology;
use crate::domain::ports::{BackendFactory, BackendSnapshot, SequenceBackend};
use anyhow::{Result, bail, ensure};
use async_trait::async_trait;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;
const CLIP_NORM: f64 = 5.0;

/// One set of network-shaped tensors: weights, gradients or Adam moments.
#[derive(Debug, Clone)]
struct Tensors {
    w_x: Array1<f64>,
    w_h: Array2<f64>,
    b_h: Array1<f64>,
    w_o: Array2<f64>,
    b_o: Array1<f64>,
}

impl Tensors {
    fn zeros(hidden: usize, outputs: usize) -> Self {
        Self {
            w_x: Array1::zeros(hidden),
            w_h: Array2::zeros((hidden, hidden)),
            b_h: Array1::zeros(hidden),
            w_o: Array2::zeros((outputs, hidden)),
            b_o: Array1::zeros(outputs),
        }
    }

    fn random(hidden: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let mut tensors = Self::zeros(hidden, outputs);
        tensors.w_x.mapv_inplace(|_| rng.random_range(-limit..limit));
        tensors.w_h.mapv_inplace(|_| rng.random_range(-limit..limit));
        tensors.w_o.mapv_inplace(|_| rng.random_range(-limit..limit));
        tensors
    }

    fn len(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.b_h.len() + self.w_o.len() + self.b_o.len()
    }

    fn flatten(&self) -> Vec<f64> {
        self.w_x
            .iter()
            .chain(self.w_h.iter())
            .chain(self.b_h.iter())
            .chain(self.w_o.iter())
            .chain(self.b_o.iter())
            .copied()
            .collect()
    }

    fn assign(&mut self, values: &[f64]) -> Result<()> {
        ensure!(
            values.len() == self.len(),
            "parameter count mismatch: expected {}, got {}",
            self.len(),
            values.len()
        );
        let slots = self
            .w_x
            .iter_mut()
            .chain(self.w_h.iter_mut())
            .chain(self.b_h.iter_mut())
            .chain(self.w_o.iter_mut())
            .chain(self.b_o.iter_mut());
        for (slot, &value) in slots.zip(values) {
            *slot = value;
        }
        Ok(())
    }

    fn norm(&self) -> f64 {
        self.flatten().iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    fn scale(&mut self, factor: f64) {
        self.w_x *= factor;
        self.w_h *= factor;
        self.b_h *= factor;
        self.w_o *= factor;
        self.b_o *= factor;
    }
}

/// Full mutable state of an `RnnBackend`, restored verbatim.
#[derive(Clone)]
struct Checkpoint {
    params: Tensors,
    m: Tensors,
    v: Tensors,
    step: i32,
    rng: StdRng,
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    step_size: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= step_size * *m / (v.sqrt() + EPSILON);
        });
}

pub struct RnnBackend {
    topology: ModelTopology,
    params: Tensors,
    m: Tensors,
    v: Tensors,
    step: i32,
    rng: StdRng,
    released: bool,
}

impl RnnBackend {
    pub fn new(topology: ModelTopology) -> Result<Self> {
        ensure!(topology.window_size > 0, "window size must be positive");
        ensure!(topology.horizon > 0, "horizon must be positive");
        ensure!(topology.hidden_units > 0, "hidden units must be positive");
        ensure!(
            topology.learning_rate.is_finite() && topology.learning_rate > 0.0,
            "learning rate must be positive, got {}",
            topology.learning_rate
        );

        let mut rng = StdRng::seed_from_u64(topology.seed);
        let params = Tensors::random(topology.hidden_units, topology.horizon, &mut rng);
        let zeros = Tensors::zeros(topology.hidden_units, topology.horizon);

        Ok(Self {
            topology,
            params,
            m: zeros.clone(),
            v: zeros,
            step: 0,
            rng,
            released: false,
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            bail!("backend buffers have been released");
        }
        Ok(())
    }

    fn check_shapes(&self, inputs: &[Vec<f64>], labels: Option<&[Vec<f64>]>) -> Result<()> {
        if let Some(bad) = inputs.iter().find(|x| x.len() != self.topology.window_size) {
            bail!(
                "input window has length {}, model expects {}",
                bad.len(),
                self.topology.window_size
            );
        }
        if let Some(labels) = labels {
            ensure!(
                labels.len() == inputs.len(),
                "{} inputs but {} labels",
                inputs.len(),
                labels.len()
            );
            if let Some(bad) = labels.iter().find(|y| y.len() != self.topology.horizon) {
                bail!(
                    "label has length {}, model expects {}",
                    bad.len(),
                    self.topology.horizon
                );
            }
        }
        Ok(())
    }

    /// Hidden states `h_0..=h_T` and the projected output.
    fn forward(&self, input: &[f64]) -> (Vec<Array1<f64>>, Array1<f64>) {
        let p = &self.params;
        let mut h = Array1::zeros(p.b_h.len());
        let mut states = Vec::with_capacity(input.len() + 1);
        states.push(h.clone());

        for &x in input {
            h = (&p.w_x * x + p.w_h.dot(&h) + &p.b_h).mapv(f64::tanh);
            states.push(h.clone());
        }

        let output = p.w_o.dot(&h) + &p.b_o;
        (states, output)
    }

    /// Mean squared error over the batch and its gradients.
    fn gradients(&self, inputs: &[&Vec<f64>], labels: &[&Vec<f64>]) -> (f64, Tensors) {
        let outputs = self.topology.horizon;
        let mut grads = Tensors::zeros(self.topology.hidden_units, outputs);
        let denom = (inputs.len() * outputs) as f64;
        let mut squared_error = 0.0;

        for (input, label) in inputs.iter().zip(labels) {
            let (states, output) = self.forward(input);
            let error = &output - &Array1::from(label.to_vec());
            squared_error += error.iter().map(|e| e * e).sum::<f64>();

            let dy = error * (2.0 / denom);
            let h_last = &states[states.len() - 1];
            grads.w_o += &dy
                .view()
                .insert_axis(Axis(1))
                .dot(&h_last.view().insert_axis(Axis(0)));
            grads.b_o += &dy;

            let mut dh = self.params.w_o.t().dot(&dy);
            for t in (1..states.len()).rev() {
                let da = &dh * &states[t].mapv(|h| 1.0 - h * h);
                grads.w_x.scaled_add(input[t - 1], &da);
                grads.w_h += &da
                    .view()
                    .insert_axis(Axis(1))
                    .dot(&states[t - 1].view().insert_axis(Axis(0)));
                grads.b_h += &da;
                dh = self.params.w_h.t().dot(&da);
            }
        }

        (squared_error / denom, grads)
    }

    fn apply(&mut self, mut grads: Tensors) {
        let norm = grads.norm();
        if norm > CLIP_NORM {
            grads.scale(CLIP_NORM / norm);
        }

        self.step += 1;
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        let step_size = self.topology.learning_rate * correction2.sqrt() / correction1;

        let (p, m, v) = (&mut self.params, &mut self.m, &mut self.v);
        adam_update(&mut p.w_x, &grads.w_x, &mut m.w_x, &mut v.w_x, step_size);
        adam_update(&mut p.w_h, &grads.w_h, &mut m.w_h, &mut v.w_h, step_size);
        adam_update(&mut p.b_h, &grads.b_h, &mut m.b_h, &mut v.b_h, step_size);
        adam_update(&mut p.w_o, &grads.w_o, &mut m.w_o, &mut v.w_o, step_size);
        adam_update(&mut p.b_o, &grads.b_o, &mut m.b_o, &mut v.b_o, step_size);
    }

    fn reset_optimizer(&mut self) {
        self.m = Tensors::zeros(self.topology.hidden_units, self.topology.horizon);
        self.v = self.m.clone();
        self.step = 0;
    }
}

#[async_trait]
impl SequenceBackend for RnnBackend {
    async fn fit_epoch(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
        batch_size: usize,
    ) -> Result<f64> {
        self.ensure_live()?;
        ensure!(!inputs.is_empty(), "no training samples");
        self.check_shapes(inputs, Some(labels))?;

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        order.shuffle(&mut self.rng);

        let mut weighted_loss = 0.0;
        for chunk in order.chunks(batch_size.max(1)) {
            let batch_inputs: Vec<&Vec<f64>> = chunk.iter().map(|&i| &inputs[i]).collect();
            let batch_labels: Vec<&Vec<f64>> = chunk.iter().map(|&i| &labels[i]).collect();

            let (loss, grads) = self.gradients(&batch_inputs, &batch_labels);
            if !loss.is_finite() {
                bail!("training diverged: non-finite loss");
            }
            self.apply(grads);
            weighted_loss += loss * chunk.len() as f64;
        }

        let epoch_loss = weighted_loss / inputs.len() as f64;
        debug!(
            "RnnBackend: epoch done (samples={}, step={}, loss={:.6})",
            inputs.len(),
            self.step,
            epoch_loss
        );
        Ok(epoch_loss)
    }

    fn predict(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.ensure_live()?;
        self.check_shapes(inputs, None)?;

        inputs
            .iter()
            .map(|input| {
                let (_, output) = self.forward(input);
                ensure!(
                    output.iter().all(|v| v.is_finite()),
                    "non-finite model output"
                );
                Ok(output.to_vec())
            })
            .collect()
    }

    fn loss(&self, inputs: &[Vec<f64>], labels: &[Vec<f64>]) -> Result<f64> {
        self.ensure_live()?;
        ensure!(!inputs.is_empty(), "no evaluation samples");
        self.check_shapes(inputs, Some(labels))?;

        let input_refs: Vec<&Vec<f64>> = inputs.iter().collect();
        let label_refs: Vec<&Vec<f64>> = labels.iter().collect();
        let (loss, _) = self.gradients(&input_refs, &label_refs);
        Ok(loss)
    }

    fn parameters(&self) -> Vec<f64> {
        self.params.flatten()
    }

    fn load_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        self.ensure_live()?;
        self.params.assign(parameters)?;
        self.reset_optimizer();
        Ok(())
    }

    fn snapshot(&self) -> BackendSnapshot {
        Box::new(Checkpoint {
            params: self.params.clone(),
            m: self.m.clone(),
            v: self.v.clone(),
            step: self.step,
            rng: self.rng.clone(),
        })
    }

    fn restore(&mut self, snapshot: BackendSnapshot) -> Result<()> {
        self.ensure_live()?;
        let Ok(checkpoint) = snapshot.downcast::<Checkpoint>() else {
            bail!("snapshot was not taken from an RNN backend");
        };
        ensure!(
            checkpoint.params.len() == self.params.len(),
            "snapshot has {} parameters, model has {}",
            checkpoint.params.len(),
            self.params.len()
        );
        let Checkpoint {
            params,
            m,
            v,
            step,
            rng,
        } = *checkpoint;
        self.params = params;
        self.m = m;
        self.v = v;
        self.step = step;
        self.rng = rng;
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.params = Tensors::zeros(0, 0);
        self.m = Tensors::zeros(0, 0);
        self.v = Tensors::zeros(0, 0);
        self.released = true;
    }
}

/// Builds `RnnBackend`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RnnBackendFactory;

impl BackendFactory for RnnBackendFactory {
    fn create(&self, topology: &ModelTopology) -> Result<Box<dyn SequenceBackend>> {
        Ok(Box::new(RnnBackend::new(*topology)?))
    }

    fn name(&self) -> &str {
        "ndarray-elman-rnn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_topology() -> ModelTopology {
        ModelTopology::new(4, 2).with_hidden_units(3).with_seed(7)
    }

    fn samples() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let series: Vec<f64> = (0..40).map(|i| 0.5 + 0.4 * (i as f64 * 0.4).sin()).collect();
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for i in 0..=series.len() - 6 {
            inputs.push(series[i..i + 4].to_vec());
            labels.push(series[i + 4..i + 6].to_vec());
        }
        (inputs, labels)
    }

    #[test]
    fn test_parameter_count() {
        let backend = RnnBackend::new(ModelTopology::new(60, 5)).unwrap();
        // w_x 16 + w_h 256 + b_h 16 + w_o 80 + b_o 5
        assert_eq!(backend.parameter_count(), 373);
        assert_eq!(backend.parameters().len(), 373);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = RnnBackend::new(tiny_topology()).unwrap();
        let b = RnnBackend::new(tiny_topology()).unwrap();
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn test_analytic_gradients_match_finite_differences() {
        let mut backend = RnnBackend::new(tiny_topology()).unwrap();
        let (inputs, labels) = samples();
        let inputs = &inputs[..5];
        let labels = &labels[..5];

        let input_refs: Vec<&Vec<f64>> = inputs.iter().collect();
        let label_refs: Vec<&Vec<f64>> = labels.iter().collect();
        let (_, grads) = backend.gradients(&input_refs, &label_refs);
        let analytic = grads.flatten();

        let base = backend.parameters();
        let eps = 1e-6;
        for i in 0..base.len() {
            let mut plus = base.clone();
            plus[i] += eps;
            backend.load_parameters(&plus).unwrap();
            let loss_plus = backend.loss(inputs, labels).unwrap();

            let mut minus = base.clone();
            minus[i] -= eps;
            backend.load_parameters(&minus).unwrap();
            let loss_minus = backend.loss(inputs, labels).unwrap();

            let numeric = (loss_plus - loss_minus) / (2.0 * eps);
            assert!(
                (numeric - analytic[i]).abs() < 1e-6,
                "param {}: numeric {} vs analytic {}",
                i,
                numeric,
                analytic[i]
            );
        }
    }

    #[tokio::test]
    async fn test_training_reduces_loss() {
        let topology = tiny_topology().with_learning_rate(0.01);
        let mut backend = RnnBackend::new(topology).unwrap();
        let (inputs, labels) = samples();

        let before = backend.loss(&inputs, &labels).unwrap();
        for _ in 0..150 {
            backend.fit_epoch(&inputs, &labels, 8).await.unwrap();
        }
        let after = backend.loss(&inputs, &labels).unwrap();

        assert!(after < before, "loss {} -> {}", before, after);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_an_error() {
        let mut backend = RnnBackend::new(tiny_topology()).unwrap();
        let err = backend
            .fit_epoch(&[vec![0.1; 3]], &[vec![0.1; 2]], 4)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("length 3"));

        assert!(backend.predict(&[vec![0.0; 5]]).is_err());
    }

    #[test]
    fn test_load_parameters_round_trip() {
        let mut a = RnnBackend::new(tiny_topology()).unwrap();
        let b = RnnBackend::new(tiny_topology().with_seed(99)).unwrap();

        a.load_parameters(&b.parameters()).unwrap();
        assert_eq!(a.parameters(), b.parameters());
        assert!(a.load_parameters(&[1.0, 2.0]).is_err());
    }

    #[tokio::test]
    async fn test_restore_replays_training_exactly() {
        let mut backend = RnnBackend::new(tiny_topology()).unwrap();
        let (inputs, labels) = samples();
        backend.fit_epoch(&inputs, &labels, 8).await.unwrap();

        let snapshot = backend.snapshot();
        let first = backend.fit_epoch(&inputs, &labels, 8).await.unwrap();
        let after_first = backend.parameters();

        backend.restore(snapshot).unwrap();
        let replay = backend.fit_epoch(&inputs, &labels, 8).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(backend.parameters(), after_first);
    }

    #[test]
    fn test_restore_rejects_foreign_snapshot() {
        let mut backend = RnnBackend::new(tiny_topology()).unwrap();
        assert!(backend.restore(Box::new(1.0_f64)).is_err());

        let larger = RnnBackend::new(tiny_topology().with_hidden_units(5)).unwrap();
        assert!(backend.restore(larger.snapshot()).is_err());
    }

    #[test]
    fn test_released_backend_refuses_work() {
        let mut backend = RnnBackend::new(tiny_topology()).unwrap();
        backend.release();
        backend.release();

        assert!(backend.predict(&[vec![0.0; 4]]).is_err());
        assert!(backend.parameters().is_empty());
    }

    #[test]
    fn test_factory_rejects_bad_topology() {
        let factory = RnnBackendFactory;
        assert!(factory.create(&ModelTopology::new(0, 5)).is_err());
        assert!(
            factory
                .create(&ModelTopology::new(10, 5).with_learning_rate(0.0))
                .is_err()
        );
        assert!(factory.create(&ModelTopology::new(10, 5)).is_ok());
    }
}
