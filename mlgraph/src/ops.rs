use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::attr::Attributes;
use crate::dtype::TensorType;

/// The closed set of operator kinds a node can have.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpKind {
    Input,
    Output,
    Constant,
    // linear algebra
    MatMul,
    Add,
    Mul,
    // convolution
    Conv2D,
    // normalization
    BatchNorm,
    LayerNorm,
    // activation
    ReLU,
    GELU,
    Sigmoid,
    Softmax,
    // pooling
    MaxPool2D,
    AvgPool2D,
    GlobalAvgPool,
    // shape manipulation
    Reshape,
    Transpose,
    Flatten,
    Concat,
    Split,
    // reduction
    ReduceSum,
    ReduceMean,
    // fused operators, produced by optimization
    FusedConvBNReLU,
    FusedLinear,
    FusedMatMulAdd,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpCategory {
    Io,
    Linear,
    Conv,
    Norm,
    Activation,
    Pool,
    Shape,
    Reduce,
    Fused,
}

/// The static registry entry for an operator kind: arity bounds, output
/// count and a descriptive category. Consulted by node constructors and
/// passes, never mutated at runtime.
#[derive(Debug, Copy, Clone)]
pub struct OpSignature {
    pub min_inputs: usize,
    pub max_inputs: usize,
    pub num_outputs: usize,
    pub description: &'static str,
    pub category: OpCategory,
}

const fn sig(
    min_inputs: usize,
    max_inputs: usize,
    num_outputs: usize,
    description: &'static str,
    category: OpCategory,
) -> OpSignature {
    OpSignature {
        min_inputs,
        max_inputs,
        num_outputs,
        description,
        category,
    }
}

impl OpKind {
    pub const ALL: &'static [Self] = &[
        OpKind::Input,
        OpKind::Output,
        OpKind::Constant,
        OpKind::MatMul,
        OpKind::Add,
        OpKind::Mul,
        OpKind::Conv2D,
        OpKind::BatchNorm,
        OpKind::LayerNorm,
        OpKind::ReLU,
        OpKind::GELU,
        OpKind::Sigmoid,
        OpKind::Softmax,
        OpKind::MaxPool2D,
        OpKind::AvgPool2D,
        OpKind::GlobalAvgPool,
        OpKind::Reshape,
        OpKind::Transpose,
        OpKind::Flatten,
        OpKind::Concat,
        OpKind::Split,
        OpKind::ReduceSum,
        OpKind::ReduceMean,
        OpKind::FusedConvBNReLU,
        OpKind::FusedLinear,
        OpKind::FusedMatMulAdd,
    ];

    #[rustfmt::skip]
    pub fn signature(self) -> OpSignature {
        use OpCategory::*;
        match self {
            OpKind::Input           => sig(0, 0, 1, "Model input tensor", Io),
            OpKind::Output          => sig(1, 1, 0, "Model output tensor", Io),
            OpKind::Constant        => sig(0, 0, 1, "Constant tensor value", Io),
            OpKind::MatMul          => sig(2, 2, 1, "Matrix multiplication", Linear),
            OpKind::Add             => sig(2, 2, 1, "Element-wise addition", Linear),
            OpKind::Mul             => sig(2, 2, 1, "Element-wise multiplication", Linear),
            OpKind::Conv2D          => sig(1, 3, 1, "2D convolution", Conv),
            OpKind::BatchNorm       => sig(1, 1, 1, "Batch normalization", Norm),
            OpKind::LayerNorm       => sig(1, 1, 1, "Layer normalization", Norm),
            OpKind::ReLU            => sig(1, 1, 1, "Rectified linear unit", Activation),
            OpKind::GELU            => sig(1, 1, 1, "Gaussian error linear unit", Activation),
            OpKind::Sigmoid         => sig(1, 1, 1, "Sigmoid activation", Activation),
            OpKind::Softmax         => sig(1, 1, 1, "Softmax normalization", Activation),
            OpKind::MaxPool2D       => sig(1, 1, 1, "2D max pooling", Pool),
            OpKind::AvgPool2D       => sig(1, 1, 1, "2D average pooling", Pool),
            OpKind::GlobalAvgPool   => sig(1, 1, 1, "Global average pooling", Pool),
            OpKind::Reshape         => sig(1, 1, 1, "Reshape tensor", Shape),
            OpKind::Transpose       => sig(1, 1, 1, "Transpose tensor dimensions", Shape),
            OpKind::Flatten         => sig(1, 1, 1, "Flatten tensor to 2D", Shape),
            OpKind::Concat          => sig(2, 16, 1, "Concatenate tensors", Shape),
            OpKind::Split           => sig(1, 1, 4, "Split tensor", Shape),
            OpKind::ReduceSum       => sig(1, 1, 1, "Sum reduction", Reduce),
            OpKind::ReduceMean      => sig(1, 1, 1, "Mean reduction", Reduce),
            OpKind::FusedConvBNReLU => sig(1, 3, 1, "Fused Conv2D + BatchNorm + ReLU", Fused),
            OpKind::FusedLinear     => sig(1, 1, 1, "Fused MatMul + Add (linear layer)", Fused),
            OpKind::FusedMatMulAdd  => sig(2, 3, 1, "Fused MatMul + Add", Fused),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Input => "Input",
            OpKind::Output => "Output",
            OpKind::Constant => "Constant",
            OpKind::MatMul => "MatMul",
            OpKind::Add => "Add",
            OpKind::Mul => "Mul",
            OpKind::Conv2D => "Conv2D",
            OpKind::BatchNorm => "BatchNorm",
            OpKind::LayerNorm => "LayerNorm",
            OpKind::ReLU => "ReLU",
            OpKind::GELU => "GELU",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::Softmax => "Softmax",
            OpKind::MaxPool2D => "MaxPool2D",
            OpKind::AvgPool2D => "AvgPool2D",
            OpKind::GlobalAvgPool => "GlobalAvgPool",
            OpKind::Reshape => "Reshape",
            OpKind::Transpose => "Transpose",
            OpKind::Flatten => "Flatten",
            OpKind::Concat => "Concat",
            OpKind::Split => "Split",
            OpKind::ReduceSum => "ReduceSum",
            OpKind::ReduceMean => "ReduceMean",
            OpKind::FusedConvBNReLU => "FusedConvBNReLU",
            OpKind::FusedLinear => "FusedLinear",
            OpKind::FusedMatMulAdd => "FusedMatMulAdd",
        }
    }

    pub fn is_fused(self) -> bool {
        matches!(self.signature().category, OpCategory::Fused)
    }
}

impl OpCategory {
    /// Display color used by the graphviz exporter.
    pub fn color(self) -> &'static str {
        match self {
            OpCategory::Io => "#6366f1",
            OpCategory::Linear => "#3b82f6",
            OpCategory::Conv => "#8b5cf6",
            OpCategory::Norm => "#ec4899",
            OpCategory::Activation => "#f59e0b",
            OpCategory::Pool => "#10b981",
            OpCategory::Shape => "#64748b",
            OpCategory::Reduce => "#06b6d4",
            OpCategory::Fused => "#ef4444",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown operator {0:?}")]
pub struct UnknownOp(pub String);

impl FromStr for OpKind {
    type Err = UnknownOp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| UnknownOp(s.to_owned()))
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Per-operator formulas for shape inference and cost estimation. They are
// colocated here so the shape pass and the metric estimators cannot drift
// apart as kinds are added.
impl OpKind {
    /// Compute the output type from the input types and operator attributes.
    ///
    /// Returns `None` when the first input type is not known yet, inference
    /// for the node is then deferred, which is not an error. Kinds without
    /// a specific formula pass the first input type through unchanged.
    pub fn infer_shape(self, inputs: &[Option<TensorType>], attrs: &Attributes) -> Option<TensorType> {
        let first = inputs.first()?.as_ref()?;

        let result = match self {
            OpKind::Conv2D | OpKind::FusedConvBNReLU => infer_conv2d(first, attrs),
            OpKind::MatMul | OpKind::FusedMatMulAdd => match inputs.get(1).and_then(|t| t.as_ref()) {
                Some(second) => infer_matmul(first, second),
                None => first.clone(),
            },
            OpKind::MaxPool2D | OpKind::AvgPool2D => infer_pool(first, attrs),
            OpKind::GlobalAvgPool => {
                TensorType::new(first.dtype, vec![dim(first, 0), dim(first, 1), 1, 1])
            }
            OpKind::Flatten => {
                let head = first.shape.first().copied().unwrap_or(1);
                let tail = first.shape.iter().skip(1).product();
                TensorType::new(first.dtype, vec![head, tail])
            }
            OpKind::Reshape => match attrs.get("shape").and_then(|v| v.as_ints()) {
                Some(target) => {
                    let shape = target.iter().map(|&d| d.max(0) as usize).collect();
                    TensorType::new(first.dtype, shape)
                }
                None => first.clone(),
            },
            OpKind::Transpose => infer_transpose(first, attrs),
            OpKind::Concat => {
                let axis = attr_usize(attrs, "axis").unwrap_or(0);
                let total = inputs
                    .iter()
                    .map(|t| t.as_ref().and_then(|t| t.shape.get(axis)).copied().unwrap_or(0))
                    .sum();
                let mut shape = first.shape.clone();
                if axis < shape.len() {
                    shape[axis] = total;
                }
                TensorType::new(first.dtype, shape)
            }
            OpKind::ReduceSum | OpKind::ReduceMean => {
                let axis = attrs.get("axis").and_then(|v| v.as_int()).unwrap_or(-1);
                let rank = first.rank() as i64;
                let real = if axis < 0 { rank + axis } else { axis };
                let shape: Vec<usize> = first
                    .shape
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i as i64 != real)
                    .map(|(_, &d)| d)
                    .collect();
                let shape = if shape.is_empty() { vec![1] } else { shape };
                TensorType::new(first.dtype, shape)
            }
            // elementwise, normalization, softmax and everything without a
            // dedicated formula keep the first input's type
            OpKind::Input
            | OpKind::Output
            | OpKind::Constant
            | OpKind::Add
            | OpKind::Mul
            | OpKind::BatchNorm
            | OpKind::LayerNorm
            | OpKind::ReLU
            | OpKind::GELU
            | OpKind::Sigmoid
            | OpKind::Softmax
            | OpKind::Split
            | OpKind::FusedLinear => first.clone(),
        };

        Some(result)
    }

    /// Estimated floating-point operation count for one execution of this
    /// operator, `0` for kinds without a cost formula.
    pub fn estimate_flops(
        self,
        output: Option<&TensorType>,
        first_input: Option<&TensorType>,
        attrs: &Attributes,
    ) -> u64 {
        let Some(output) = output else { return 0 };
        let out_elems = output.num_elements() as u64;

        match self {
            OpKind::Conv2D | OpKind::FusedConvBNReLU => {
                let in_c = first_input.map_or(1, |t| dim(t, 1)) as u64;
                let k = attr_usize(attrs, "kernel").unwrap_or(3) as u64;
                // multiply-accumulate
                out_elems * in_c * k * k * 2
            }
            OpKind::MatMul | OpKind::FusedMatMulAdd | OpKind::FusedLinear => {
                let contraction = first_input.and_then(|t| t.shape.last()).copied().unwrap_or(1) as u64;
                out_elems * contraction * 2
            }
            // mean, variance, normalize, scale
            OpKind::BatchNorm | OpKind::LayerNorm => out_elems * 4,
            // exp, sum, divide
            OpKind::Softmax => out_elems * 3,
            OpKind::ReLU | OpKind::GELU | OpKind::Sigmoid => out_elems,
            OpKind::Add | OpKind::Mul => out_elems,
            _ => 0,
        }
    }

    /// Estimated trainable parameter count, `0` for parameterless kinds.
    pub fn estimate_params(
        self,
        first_input: Option<&TensorType>,
        output: Option<&TensorType>,
        attrs: &Attributes,
    ) -> u64 {
        match self {
            OpKind::Conv2D | OpKind::FusedConvBNReLU => {
                let in_c = first_input.map_or(1, |t| dim(t, 1)) as u64;
                let out_c = attr_usize(attrs, "filters").map_or(in_c, |f| f as u64);
                let k = attr_usize(attrs, "kernel").unwrap_or(3) as u64;
                // weights + bias
                out_c * in_c * k * k + out_c
            }
            OpKind::MatMul | OpKind::FusedMatMulAdd | OpKind::FusedLinear => {
                let in_features = first_input.and_then(|t| t.shape.last()).copied().unwrap_or(1) as u64;
                let out_features = output.and_then(|t| t.shape.last()).copied().unwrap_or(1) as u64;
                in_features * out_features + out_features
            }
            // gamma, beta, running mean, running variance
            OpKind::BatchNorm | OpKind::LayerNorm => {
                let channels = first_input.map_or(1, |t| dim(t, 1)) as u64;
                channels * 4
            }
            _ => 0,
        }
    }
}

/// The size of axis `i`, defaulting to 1 past the end of the shape.
fn dim(ty: &TensorType, i: usize) -> usize {
    ty.shape.get(i).copied().unwrap_or(1)
}

fn attr_usize(attrs: &Attributes, key: &str) -> Option<usize> {
    attrs.get(key).and_then(|v| v.as_usize())
}

fn infer_conv2d(input: &TensorType, attrs: &Attributes) -> TensorType {
    // input layout is NCHW
    let n = dim(input, 0);
    let c = dim(input, 1);
    let h = dim(input, 2);
    let w = dim(input, 3);

    let filters = attr_usize(attrs, "filters").unwrap_or(c);
    let kernel = attr_usize(attrs, "kernel").unwrap_or(3);
    let stride = attr_usize(attrs, "stride").unwrap_or(1).max(1);
    let padding = attr_usize(attrs, "padding").unwrap_or(0);

    let out_h = (h + 2 * padding).saturating_sub(kernel) / stride + 1;
    let out_w = (w + 2 * padding).saturating_sub(kernel) / stride + 1;
    TensorType::new(input.dtype, vec![n, filters, out_h, out_w])
}

fn infer_matmul(left: &TensorType, right: &TensorType) -> TensorType {
    // all but the last axis of the left operand, plus the last axis of the right
    let mut shape = left.shape.clone();
    shape.pop();
    shape.push(right.shape.last().copied().unwrap_or(1));
    TensorType::new(left.dtype, shape)
}

fn infer_pool(input: &TensorType, attrs: &Attributes) -> TensorType {
    let kernel = attr_usize(attrs, "kernel").unwrap_or(2);
    let stride = attr_usize(attrs, "stride").unwrap_or(kernel).max(1);

    let n = dim(input, 0);
    let c = dim(input, 1);
    let out_h = dim(input, 2) / stride;
    let out_w = dim(input, 3) / stride;
    TensorType::new(input.dtype, vec![n, c, out_h, out_w])
}

fn infer_transpose(input: &TensorType, attrs: &Attributes) -> TensorType {
    let rank = input.rank();

    let perm: Vec<usize> = match attrs.get("perm").and_then(|v| v.as_ints()) {
        Some(perm) => {
            let perm: Vec<usize> = perm.iter().map(|&i| i.max(0) as usize).collect();
            let valid = perm.len() == rank && perm.iter().all(|&i| i < rank);
            if !valid {
                // a malformed permutation defers to the input type unchanged
                return input.clone();
            }
            perm
        }
        None => (0..rank).rev().collect(),
    };

    let shape = perm.iter().map(|&i| input.shape[i]).collect();
    TensorType::new(input.dtype, shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_consistent() {
        for &op in OpKind::ALL {
            let sig = op.signature();
            assert!(sig.min_inputs <= sig.max_inputs, "bad arity bounds for {}", op);
            assert_eq!(op.name().parse::<OpKind>().unwrap(), op);
        }
        assert!("Conv3D".parse::<OpKind>().is_err());
    }

    #[test]
    fn io_arities() {
        assert_eq!(OpKind::Input.signature().max_inputs, 0);
        assert_eq!(OpKind::Constant.signature().max_inputs, 0);
        assert_eq!(OpKind::Output.signature().num_outputs, 0);
        assert_eq!(OpKind::Output.signature().min_inputs, 1);
    }
}
