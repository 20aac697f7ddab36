//! Dense (fully connected) layer.
//!
//! [`Dense`] computes `y = xW + b` with `W` of shape `[in_features, out_features]`.
//! Training follows a forward/backward/apply cycle: [`Dense::forward_train`]
//! caches its input, [`Dense::backward`] turns an upstream gradient into
//! weight, bias and input gradients, and [`Dense::apply_gradients`] hands the
//! stored gradients to the layer's optimizers.

use std::fmt;

use duotower_core::InitializerConfig;
use duotower_optimizer::{create_optimizer, OptimizerConfig, OptimizerDyn};
use ndarray::{Array1, Array2, ArrayView2, Axis, ErrorKind, ShapeError};
use rand::RngCore;

use crate::error::{LayerError, LayerResult};
use crate::initializer::create_initializer;

/// A dense (fully connected) layer with its own optimizer state.
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Array2<f32>,
    /// Bias vector of shape [out_features]
    bias: Array1<f32>,
    weights_grad: Option<Array2<f32>>,
    bias_grad: Option<Array1<f32>>,
    cached_input: Option<Array2<f32>>,
    weight_optimizer: Box<dyn OptimizerDyn>,
    bias_optimizer: Box<dyn OptimizerDyn>,
}

impl fmt::Debug for Dense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dense")
            .field("in_features", &self.in_features())
            .field("out_features", &self.out_features())
            .finish()
    }
}

impl Dense {
    /// Creates a layer with initialized weights and zero bias.
    pub fn new(
        in_features: usize,
        out_features: usize,
        init: &InitializerConfig,
        optimizer: &OptimizerConfig,
        rng: &mut dyn RngCore,
    ) -> LayerResult<Self> {
        init.validate()?;
        let values = create_initializer(init).initialize(in_features * out_features, rng);
        let weights = Array2::from_shape_vec((in_features, out_features), values)?;
        Self::from_weights(weights, Array1::zeros(out_features), optimizer)
    }

    /// Creates a layer with explicit weights and bias.
    pub fn from_weights(
        weights: Array2<f32>,
        bias: Array1<f32>,
        optimizer: &OptimizerConfig,
    ) -> LayerResult<Self> {
        if weights.ncols() != bias.len() {
            return Err(LayerError::InvalidInputDimension {
                expected: weights.ncols(),
                actual: bias.len(),
            });
        }
        Ok(Self {
            weights: weights.as_standard_layout().into_owned(),
            bias,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            weight_optimizer: create_optimizer(optimizer.clone())?,
            bias_optimizer: create_optimizer(optimizer.clone())?,
        })
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.weights.nrows()
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Returns a reference to the weights.
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Returns a reference to the bias.
    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    /// Returns the weight gradients computed by the last backward pass.
    pub fn weights_grad(&self) -> Option<&Array2<f32>> {
        self.weights_grad.as_ref()
    }

    /// Returns the bias gradients computed by the last backward pass.
    pub fn bias_grad(&self) -> Option<&Array1<f32>> {
        self.bias_grad.as_ref()
    }

    /// Clears the cached input and gradients.
    pub fn clear_cache(&mut self) {
        self.cached_input = None;
        self.weights_grad = None;
        self.bias_grad = None;
    }

    /// Inference forward pass.
    pub fn forward(&self, input: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        if input.ncols() != self.in_features() {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features(),
                actual: input.ncols(),
            });
        }
        Ok(input.dot(&self.weights) + &self.bias)
    }

    /// Forward pass that caches the input for [`Dense::backward`].
    pub fn forward_train(&mut self, input: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.to_owned());
        Ok(output)
    }

    /// Computes parameter gradients and returns the gradient w.r.t. the input.
    pub fn backward(&mut self, grad: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        if grad.ncols() != self.out_features() || grad.nrows() != input.nrows() {
            return Err(LayerError::InvalidInputDimension {
                expected: self.out_features(),
                actual: grad.ncols(),
            });
        }

        // dL/dW = x^T @ dL/dy
        self.weights_grad = Some(input.t().dot(&grad));
        // dL/db = sum(dL/dy, axis=0)
        self.bias_grad = Some(grad.sum_axis(Axis(0)));
        // dL/dx = dL/dy @ W^T
        Ok(grad.dot(&self.weights.t()))
    }

    /// Applies the gradients stored by the last backward pass.
    pub fn apply_gradients(&mut self) -> LayerResult<()> {
        let weights_grad = self.weights_grad.take().ok_or(LayerError::NotInitialized)?;
        let bias_grad = self.bias_grad.take().ok_or(LayerError::NotInitialized)?;
        self.cached_input = None;

        let weights_grad: Vec<f32> = weights_grad.iter().copied().collect();
        let weights = self
            .weights
            .as_slice_mut()
            .ok_or_else(|| ShapeError::from_kind(ErrorKind::IncompatibleLayout))?;
        self.weight_optimizer.apply_gradients(weights, &weights_grad);

        let bias_grad: Vec<f32> = bias_grad.iter().copied().collect();
        let bias = self
            .bias
            .as_slice_mut()
            .ok_or_else(|| ShapeError::from_kind(ErrorKind::IncompatibleLayout))?;
        self.bias_optimizer.apply_gradients(bias, &bias_grad);
        Ok(())
    }
}
