//! Small dense networks with explicit gradients
//!
//! The agents use two- and three-layer perceptrons whose backward passes are
//! written out by hand; every loss below reduces to a gradient on the output
//! columns, which these layers propagate back to parameter updates. Batches
//! are column-major throughout, matching the rest of the workspace.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One fully connected layer, `y = W x + b` on column batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix, `(out_dim, in_dim)`
    pub weight: Array2<f64>,
    /// Bias vector, `(out_dim,)`
    pub bias: Array1<f64>,
}

impl Dense {
    /// Xavier-uniform initialization
    #[must_use]
    pub fn xavier(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        let weight =
            Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-limit..limit));
        Self {
            weight,
            bias: Array1::zeros(out_dim),
        }
    }

    /// All-zero layer. Used for policy output heads so the initial policy
    /// is exactly uniform.
    #[must_use]
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            weight: Array2::zeros((out_dim, in_dim)),
            bias: Array1::zeros(out_dim),
        }
    }

    /// Output dimension
    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    /// Input dimension
    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn forward(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut y = self.weight.dot(x);
        for mut col in y.axis_iter_mut(Axis(1)) {
            col += &self.bias;
        }
        y
    }
}

/// Gradient of one layer's parameters
#[derive(Debug, Clone)]
pub struct LayerGrads {
    /// Gradient on the weight matrix
    pub weight: Array2<f64>,
    /// Gradient on the bias vector
    pub bias: Array1<f64>,
}

/// Activations recorded during a forward pass, consumed by `backward`
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Layer inputs; `activations[0]` is the network input
    activations: Vec<Array2<f64>>,
    /// Pre-activation outputs of each layer
    pre_activations: Vec<Array2<f64>>,
}

/// Multi-layer perceptron with ReLU hidden layers and a linear output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    /// Build from `dims = [in, hidden.., out]` with Xavier-initialized layers
    #[must_use]
    pub fn new(dims: &[usize], rng: &mut StdRng) -> Self {
        let layers = dims
            .windows(2)
            .map(|w| Dense::xavier(w[0], w[1], rng))
            .collect();
        Self { layers }
    }

    /// Build from explicit layers (e.g. a zero-initialized output head)
    #[must_use]
    pub fn from_layers(layers: Vec<Dense>) -> Self {
        Self { layers }
    }

    /// The layer stack
    #[must_use]
    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Replace the layer stack, validating the architecture is unchanged
    pub fn set_layers(&mut self, layers: Vec<Dense>) -> koopman_rl_core::Result<()> {
        if layers.len() != self.layers.len() {
            return Err(koopman_rl_core::KoopmanError::Checkpoint(format!(
                "layer count mismatch: expected {}, got {}",
                self.layers.len(),
                layers.len()
            )));
        }
        for (current, incoming) in self.layers.iter().zip(&layers) {
            if current.weight.dim() != incoming.weight.dim() {
                return Err(koopman_rl_core::KoopmanError::Checkpoint(format!(
                    "layer shape mismatch: expected {:?}, got {:?}",
                    current.weight.dim(),
                    incoming.weight.dim()
                )));
            }
        }
        self.layers = layers;
        Ok(())
    }

    /// Network input dimension
    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    /// Network output dimension
    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    /// Forward pass on a `(in_dim, B)` column batch
    #[must_use]
    pub fn forward(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut h = self.layers[0].forward(x);
        for layer in &self.layers[1..] {
            h.mapv_inplace(|v| v.max(0.0));
            h = layer.forward(&h.view());
        }
        h
    }

    /// Forward pass that records the activations needed for `backward`
    #[must_use]
    pub fn forward_cached(&self, x: &ArrayView2<f64>) -> (Array2<f64>, ForwardCache) {
        let mut activations = vec![x.to_owned()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let last = self.layers.len() - 1;
        let mut h = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&h.view());
            pre_activations.push(z.clone());
            h = if i < last {
                let a = z.mapv(|v| v.max(0.0));
                activations.push(a.clone());
                a
            } else {
                z
            };
        }
        (
            h,
            ForwardCache {
                activations,
                pre_activations,
            },
        )
    }

    /// Backpropagate `grad_output` (same shape as the forward output)
    /// through the cached pass. Returns per-layer parameter gradients and
    /// the gradient on the network input. The caller owns any batch
    /// normalization of the loss; gradients here are plain sums over the
    /// batch columns.
    #[must_use]
    pub fn backward(
        &self,
        cache: &ForwardCache,
        grad_output: &ArrayView2<f64>,
    ) -> (Vec<LayerGrads>, Array2<f64>) {
        let last = self.layers.len() - 1;
        let mut grads = vec![
            LayerGrads {
                weight: Array2::zeros((0, 0)),
                bias: Array1::zeros(0),
            };
            self.layers.len()
        ];
        let mut dz = grad_output.to_owned();
        for i in (0..self.layers.len()).rev() {
            if i < last {
                // ReLU mask from the stored pre-activation
                dz.zip_mut_with(&cache.pre_activations[i], |g, &z| {
                    if z <= 0.0 {
                        *g = 0.0;
                    }
                });
            }
            let input = &cache.activations[i];
            grads[i] = LayerGrads {
                weight: dz.dot(&input.t()),
                bias: dz.sum_axis(Axis(1)),
            };
            dz = self.layers[i].weight.t().dot(&dz);
        }
        (grads, dz)
    }

    /// Polyak averaging: `theta <- (1 - tau) theta + tau source`
    pub fn soft_update_from(&mut self, source: &Mlp, tau: f64) {
        for (target, src) in self.layers.iter_mut().zip(&source.layers) {
            target.weight.zip_mut_with(&src.weight, |t, &s| {
                *t = (1.0 - tau) * *t + tau * s;
            });
            target.bias.zip_mut_with(&src.bias, |t, &s| {
                *t = (1.0 - tau) * *t + tau * s;
            });
        }
    }
}

/// Per-tensor first and second moments for one layer
#[derive(Debug, Clone)]
struct Moments {
    m_weight: Array2<f64>,
    v_weight: Array2<f64>,
    m_bias: Array1<f64>,
    v_bias: Array1<f64>,
}

/// Adam optimizer bound to one network's parameter shapes
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step_count: u64,
    moments: Vec<Moments>,
}

impl Adam {
    /// Optimizer with the usual defaults (`beta1 = 0.9`, `beta2 = 0.999`)
    #[must_use]
    pub fn new(network: &Mlp, learning_rate: f64) -> Self {
        let moments = network
            .layers()
            .iter()
            .map(|layer| Moments {
                m_weight: Array2::zeros(layer.weight.dim()),
                v_weight: Array2::zeros(layer.weight.dim()),
                m_bias: Array1::zeros(layer.bias.dim()),
                v_bias: Array1::zeros(layer.bias.dim()),
            })
            .collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step_count: 0,
            moments,
        }
    }

    /// Apply one bias-corrected Adam step
    pub fn step(&mut self, network: &mut Mlp, grads: &[LayerGrads]) {
        self.step_count += 1;
        let t = self.step_count as i32;
        let bc1 = 1.0 - self.beta1.powi(t);
        let bc2 = 1.0 - self.beta2.powi(t);
        for ((layer, grad), moment) in
            network.layers.iter_mut().zip(grads).zip(&mut self.moments)
        {
            update_tensor(
                &mut layer.weight,
                &grad.weight,
                &mut moment.m_weight,
                &mut moment.v_weight,
                self.learning_rate,
                self.beta1,
                self.beta2,
                self.epsilon,
                bc1,
                bc2,
            );
            update_vector(
                &mut layer.bias,
                &grad.bias,
                &mut moment.m_bias,
                &mut moment.v_bias,
                self.learning_rate,
                self.beta1,
                self.beta2,
                self.epsilon,
                bc1,
                bc2,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn update_tensor(
    param: &mut Array2<f64>,
    grad: &Array2<f64>,
    m: &mut Array2<f64>,
    v: &mut Array2<f64>,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    bc1: f64,
    bc2: f64,
) {
    azip_update(
        param.iter_mut(),
        grad.iter(),
        m.iter_mut(),
        v.iter_mut(),
        lr,
        beta1,
        beta2,
        eps,
        bc1,
        bc2,
    );
}

#[allow(clippy::too_many_arguments)]
fn update_vector(
    param: &mut Array1<f64>,
    grad: &Array1<f64>,
    m: &mut Array1<f64>,
    v: &mut Array1<f64>,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    bc1: f64,
    bc2: f64,
) {
    azip_update(
        param.iter_mut(),
        grad.iter(),
        m.iter_mut(),
        v.iter_mut(),
        lr,
        beta1,
        beta2,
        eps,
        bc1,
        bc2,
    );
}

#[allow(clippy::too_many_arguments)]
fn azip_update<'a>(
    params: impl Iterator<Item = &'a mut f64>,
    grads: impl Iterator<Item = &'a f64>,
    ms: impl Iterator<Item = &'a mut f64>,
    vs: impl Iterator<Item = &'a mut f64>,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    bc1: f64,
    bc2: f64,
) {
    for (((p, &g), m), v) in params.zip(grads).zip(ms).zip(vs) {
        *m = beta1 * *m + (1.0 - beta1) * g;
        *v = beta2 * *v + (1.0 - beta2) * g * g;
        let m_hat = *m / bc1;
        let v_hat = *v / bc2;
        *p -= lr * m_hat / (v_hat.sqrt() + eps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn forward_matches_hand_computation() {
        let layer = Dense {
            weight: array![[1.0, -1.0], [0.5, 2.0]],
            bias: array![0.1, -0.2],
        };
        let net = Mlp::from_layers(vec![layer]);
        let x = array![[2.0], [3.0]];
        let y = net.forward(&x.view());
        assert_relative_eq!(y[[0, 0]], 2.0 - 3.0 + 0.1);
        assert_relative_eq!(y[[1, 0]], 1.0 + 6.0 - 0.2);
    }

    #[test]
    fn backward_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let net = Mlp::new(&[2, 4, 1], &mut rng);
        let x = array![[0.3, -0.7], [1.1, 0.4]];

        // Loss = sum of outputs; grad_output is all ones.
        let (_, cache) = net.forward_cached(&x.view());
        let ones = Array2::ones((1, 2));
        let (grads, _) = net.backward(&cache, &ones.view());

        let eps = 1e-6;
        for (li, layer) in net.layers().iter().enumerate() {
            for r in 0..layer.weight.nrows() {
                for c in 0..layer.weight.ncols() {
                    let mut plus = net.clone();
                    plus.layers[li].weight[[r, c]] += eps;
                    let mut minus = net.clone();
                    minus.layers[li].weight[[r, c]] -= eps;
                    let f_plus = plus.forward(&x.view()).sum();
                    let f_minus = minus.forward(&x.view()).sum();
                    let numeric = (f_plus - f_minus) / (2.0 * eps);
                    assert_relative_eq!(
                        grads[li].weight[[r, c]],
                        numeric,
                        epsilon = 1e-4
                    );
                }
            }
        }
    }

    #[test]
    fn adam_descends_a_quadratic() {
        // Fit y = 3x with a single linear layer under squared error.
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = Mlp::new(&[1, 1], &mut rng);
        let mut opt = Adam::new(&net, 0.05);
        let x = array![[1.0, 2.0, -1.0, 0.5]];
        let target = x.mapv(|v| 3.0 * v);
        for _ in 0..500 {
            let (out, cache) = net.forward_cached(&x.view());
            let grad = &out - &target;
            let (grads, _) = net.backward(&cache, &grad.view());
            opt.step(&mut net, &grads);
        }
        assert_relative_eq!(net.layers()[0].weight[[0, 0]], 3.0, epsilon = 1e-2);
        assert_relative_eq!(net.layers()[0].bias[0], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn polyak_update_moves_toward_source() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut target = Mlp::new(&[2, 2], &mut rng);
        let source = Mlp::new(&[2, 2], &mut rng);
        let before = target.layers()[0].weight[[0, 0]];
        let src = source.layers()[0].weight[[0, 0]];
        target.soft_update_from(&source, 0.25);
        let after = target.layers()[0].weight[[0, 0]];
        assert_relative_eq!(after, 0.75 * before + 0.25 * src, epsilon = 1e-12);
    }
}
