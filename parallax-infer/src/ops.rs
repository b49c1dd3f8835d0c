//! Tensor kernels shared by both runners.
//!
//! Each [`OpKind`](crate::graph::OpKind) maps to one kernel. The native
//! interpreter and the compiled plan both dispatch through [`apply`], so the
//! two runners differ only in how they resolve tensors, never in arithmetic.

use crate::error::RunError;
use crate::graph::OpKind;
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rayon::prelude::*;

/// Execute one op on resolved operands.
///
/// `weight` must be present iff the op references one (enforced by graph
/// validation). `parallel` selects the data-parallel kernel path used by the
/// accelerator execution plan.
pub fn apply(
    op: &OpKind,
    inputs: &[&ArrayD<f32>],
    weight: Option<&ArrayD<f32>>,
    parallel: bool,
) -> Result<ArrayD<f32>, RunError> {
    match op {
        OpKind::Identity => Ok(inputs[0].clone()),
        OpKind::Scale { factor } => Ok(inputs[0].mapv(|v| v * factor)),
        OpKind::Flatten => flatten(inputs[0]),
        OpKind::MatMul { .. } => matmul(inputs[0], required(op, weight)?, parallel),
        OpKind::AddBias { .. } => add_bias(inputs[0], required(op, weight)?),
        OpKind::Relu => Ok(inputs[0].mapv(|v| v.max(0.0))),
        OpKind::Softmax => softmax(inputs[0]),
        OpKind::Concat => concat(inputs),
        OpKind::GateOnMean { threshold } => Ok(gate_on_mean(inputs[0], *threshold)),
    }
}

fn required<'a>(op: &OpKind, weight: Option<&'a ArrayD<f32>>) -> Result<&'a ArrayD<f32>, RunError> {
    weight.ok_or_else(|| RunError::MissingWeight {
        op: op.name().to_string(),
    })
}

/// Reshape to `(1, len)` regardless of input rank.
fn flatten(x: &ArrayD<f32>) -> Result<ArrayD<f32>, RunError> {
    let len = x.len();
    let data: Vec<f32> = x.iter().copied().collect();
    Ok(Array2::from_shape_vec((1, len), data)?.into_dyn())
}

fn matmul(x: &ArrayD<f32>, w: &ArrayD<f32>, parallel: bool) -> Result<ArrayD<f32>, RunError> {
    let x2 = x.view().into_dimensionality::<Ix2>()?;
    let w2 = w.view().into_dimensionality::<Ix2>()?;

    if x2.ncols() != w2.nrows() {
        return Err(RunError::Incompatible {
            op: "matmul".to_string(),
            lhs: x.shape().to_vec(),
            rhs: w.shape().to_vec(),
        });
    }

    if !parallel {
        return Ok(x2.dot(&w2).into_dyn());
    }

    let (m, n) = (x2.nrows(), w2.ncols());
    let rows: Vec<Vec<f32>> = (0..m)
        .into_par_iter()
        .map(|i| {
            let row = x2.row(i);
            (0..n).map(|j| row.dot(&w2.column(j))).collect()
        })
        .collect();

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((m, n), flat)?.into_dyn())
}

fn add_bias(x: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>, RunError> {
    let x2 = x.view().into_dimensionality::<Ix2>()?;
    let b1 = b.view().into_dimensionality::<Ix1>()?;

    if x2.ncols() != b1.len() {
        return Err(RunError::Incompatible {
            op: "add_bias".to_string(),
            lhs: x.shape().to_vec(),
            rhs: b.shape().to_vec(),
        });
    }

    Ok((&x2 + &b1).into_dyn())
}

/// Numerically stable softmax along the last axis. Rank 1 and 2 inputs.
fn softmax(x: &ArrayD<f32>) -> Result<ArrayD<f32>, RunError> {
    let x2 = if x.ndim() == 1 {
        x.view().insert_axis(Axis(0)).into_dimensionality::<Ix2>()?
    } else {
        x.view().into_dimensionality::<Ix2>()?
    };

    let mut out = x2.to_owned();
    for mut row in out.rows_mut() {
        let max = *row.max()?;
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    if x.ndim() == 1 {
        Ok(out.remove_axis(Axis(0)).into_dyn())
    } else {
        Ok(out.into_dyn())
    }
}

/// Concatenate 2-D inputs along the feature axis.
fn concat(inputs: &[&ArrayD<f32>]) -> Result<ArrayD<f32>, RunError> {
    let mut views = Vec::with_capacity(inputs.len());
    for input in inputs {
        views.push(input.view().into_dimensionality::<Ix2>()?);
    }

    let rows = views[0].nrows();
    for (a, b) in views.iter().zip(views.iter().skip(1)) {
        if b.nrows() != rows {
            return Err(RunError::Incompatible {
                op: "concat".to_string(),
                lhs: a.shape().to_vec(),
                rhs: b.shape().to_vec(),
            });
        }
    }

    Ok(ndarray::concatenate(Axis(1), &views)?.into_dyn())
}

/// Pass the input through when its mean exceeds `threshold`, else zeros.
fn gate_on_mean(x: &ArrayD<f32>, threshold: f32) -> ArrayD<f32> {
    let mean = x.mean().unwrap_or(0.0);
    if mean > threshold {
        x.clone()
    } else {
        ArrayD::zeros(x.raw_dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpKind;

    fn dyn2(rows: usize, cols: usize, data: Vec<f32>) -> ArrayD<f32> {
        Array2::from_shape_vec((rows, cols), data).unwrap().into_dyn()
    }

    #[test]
    fn scale_multiplies_elementwise() {
        let x = dyn2(1, 3, vec![1.0, -2.0, 3.0]);
        let out = apply(&OpKind::Scale { factor: 2.0 }, &[&x], None, false).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[2.0, -4.0, 6.0]);
    }

    #[test]
    fn flatten_reshapes_to_row() {
        let x = ArrayD::<f32>::zeros(vec![3, 2, 4]);
        let out = apply(&OpKind::Flatten, &[&x], None, false).unwrap();
        assert_eq!(out.shape(), &[1, 24]);
    }

    #[test]
    fn matmul_sequential_and_parallel_agree() {
        let x = dyn2(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let w = dyn2(3, 2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let op = OpKind::MatMul {
            weight: "w".to_string(),
        };

        let seq = apply(&op, &[&x], Some(&w), false).unwrap();
        let par = apply(&op, &[&x], Some(&w), true).unwrap();

        assert_eq!(seq, par);
        assert_eq!(seq.shape(), &[2, 2]);
        assert_eq!(seq[[0, 0]], 4.0);
        assert_eq!(seq[[0, 1]], 5.0);
    }

    #[test]
    fn matmul_rejects_incompatible_shapes() {
        let x = dyn2(1, 3, vec![1.0, 2.0, 3.0]);
        let w = dyn2(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        let op = OpKind::MatMul {
            weight: "w".to_string(),
        };

        let err = apply(&op, &[&x], Some(&w), false).unwrap_err();
        assert!(matches!(err, RunError::Incompatible { .. }));
    }

    #[test]
    fn add_bias_broadcasts_rows() {
        let x = dyn2(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Array1::from_vec(vec![10.0, 20.0]).into_dyn();
        let op = OpKind::AddBias {
            weight: "b".to_string(),
        };

        let out = apply(&op, &[&x], Some(&b), false).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = dyn2(2, 3, vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]);
        let out = apply(&OpKind::Softmax, &[&x], None, false).unwrap();

        let out2 = out.into_dimensionality::<Ix2>().unwrap();
        for row in out2.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        // large logits must not overflow to NaN
        assert!((out2[[1, 0]] - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn concat_joins_feature_axis() {
        let a = dyn2(1, 2, vec![1.0, 2.0]);
        let b = dyn2(1, 3, vec![3.0, 4.0, 5.0]);

        let out = apply(&OpKind::Concat, &[&a, &b], None, false).unwrap();
        assert_eq!(out.shape(), &[1, 5]);
        assert_eq!(out.as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn gate_passes_above_threshold_and_zeroes_below() {
        let x = dyn2(1, 2, vec![1.0, 1.0]);
        let op = OpKind::GateOnMean { threshold: 0.5 };
        let out = apply(&op, &[&x], None, false).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[1.0, 1.0]);

        let op = OpKind::GateOnMean { threshold: 2.0 };
        let out = apply(&op, &[&x], None, false).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[0.0, 0.0]);
    }
}
