// ============================================================
// Layer 5 - Classifier Abstraction and Compilation
// ============================================================
// Both architectures implement ImageClassifier, so training,
// evaluation and inference are written once.
//
// A model is "compiled" by pairing it with its optimizer and
// learning rate. Every architecture is compiled the same way:
//
//   optimizer: Adam, learning rate 0.001
//   loss:      sparse categorical cross-entropy (integer labels)
//   metric:    categorical accuracy (argmax == label)
//
// The softmax of the last layer is folded into the loss: the
// loss is computed on logits, and `forward` applies softmax for
// callers that want probabilities.

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, Optimizer},
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};

use crate::infra::metrics::History;

/// Output classes of both architectures.
pub const NUM_CLASSES: usize = 12;

pub const LEARNING_RATE: f64 = 1e-3;

// ─── ImageClassifier ──────────────────────────────────────────────────────────
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// images: [batch, channels, height, width] → logits: [batch, num_classes]
    fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;

    /// Class probabilities; every row sums to 1.
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(images), 1)
    }
}

/// Mean cross-entropy between logits and integer class labels.
pub fn sparse_categorical_crossentropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// How many rows have their highest score on the target class.
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1]; flatten before comparing with [batch]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

// ─── CompiledModel ────────────────────────────────────────────────────────────
/// A model bound to its optimizer, learning rate and training history.
pub struct CompiledModel<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub(crate) model: M,
    pub(crate) optim: O,
    learning_rate: f64,
    pub(crate) history: History,
    _backend: std::marker::PhantomData<B>,
}

impl<B, M, O> CompiledModel<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optim: O, learning_rate: f64) -> Self {
        Self {
            model,
            optim,
            learning_rate,
            history: History::default(),
            _backend: std::marker::PhantomData,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Metrics of every epoch trained so far, oldest first.
    pub fn history(&self) -> &History {
        &self.history
    }
}

/// Bind `model` to Adam (lr 0.001) and the shared loss and metric.
pub fn compile<B, M>(model: M) -> CompiledModel<B, M, impl Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
{
    // Same epsilon as Keras' Adam; burn's default is 1e-5
    let optim = AdamConfig::new().with_epsilon(1e-7).init::<B, M>();
    tracing::debug!(
        "Compiled model with {} parameters (Adam, lr={})",
        model.num_params(),
        LEARNING_RATE
    );
    CompiledModel::new(model, optim, LEARNING_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_correct_predictions_counts_argmax_hits() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_floats([[0.1, 2.0, 0.3], [5.0, 1.0, 0.0], [0.0, 0.0, 9.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1, 2, 2], &device);
        assert_eq!(correct_predictions(logits, targets), 2);
    }

    #[test]
    fn test_crossentropy_is_low_for_confident_correct_logits() {
        let device = Default::default();
        let good = Tensor::<B, 2>::from_floats([[10.0, 0.0], [0.0, 10.0]], &device);
        let bad = Tensor::<B, 2>::from_floats([[0.0, 10.0], [10.0, 0.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([0, 1], &device);

        let good_loss = sparse_categorical_crossentropy(good, targets.clone())
            .into_scalar()
            .elem::<f64>();
        let bad_loss = sparse_categorical_crossentropy(bad, targets)
            .into_scalar()
            .elem::<f64>();

        assert!(good_loss < 0.01);
        assert!(bad_loss > 5.0);
    }
}
