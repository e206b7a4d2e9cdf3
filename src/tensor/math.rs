//! Element-wise, reduction, and activation methods. Every pure method
//! takes an optional destination: a supplied destination must have exactly
//! the computed output shape (and must not alias an operand); otherwise a
//! fresh tensor is allocated. In-place methods mutate through the buffer
//! lock and require a contiguous FP32 tensor.

use super::{f32s, f32s_mut, Cells, Tensor, TensorError, TensorResult};
use crate::dtype::DataType;
use crate::kernels::{activation, blas, elementwise, reduce, Layout};
use crate::shape::Shape;

type BinKernel = fn(&mut [f32], &Layout, &[f32], &Layout, &[f32], &Layout, &Shape);
type UnKernel = fn(&mut [f32], &Layout, &[f32], &Layout, &Shape);
type UnScalarKernel = fn(&mut [f32], &Layout, &[f32], &Layout, &Shape, f32);
type BinScalarKernel = fn(&mut [f32], &Layout, &[f32], &Layout, &[f32], &Layout, &Shape, f32);

impl Tensor {
    fn ew_binary(
        &self,
        rhs: &Tensor,
        dst: Option<&Tensor>,
        op: &'static str,
        k: BinKernel,
    ) -> TensorResult<Tensor> {
        self.check_f32(op)?;
        rhs.check_f32(op)?;
        self.check_same_shape(rhs)?;
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, op)?;
        rhs.check_no_alias(&out, op)?;
        let mut dg = out.buf.write();
        let d = f32s_mut(&mut dg, op)?;
        if self.id() == rhs.id() {
            let g = self.buf.read();
            let s = f32s(&g, op)?;
            k(d, &out.layout(), s, &self.layout(), s, &rhs.layout(), &self.shape);
        } else {
            let ag = self.buf.read();
            let bg = rhs.buf.read();
            k(
                d,
                &out.layout(),
                f32s(&ag, op)?,
                &self.layout(),
                f32s(&bg, op)?,
                &rhs.layout(),
                &self.shape,
            );
        }
        drop(dg);
        Ok(out)
    }

    fn ew_unary(&self, dst: Option<&Tensor>, op: &'static str, k: UnKernel) -> TensorResult<Tensor> {
        self.check_f32(op)?;
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, op)?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        k(
            f32s_mut(&mut dg, op)?,
            &out.layout(),
            f32s(&sg, op)?,
            &self.layout(),
            &self.shape,
        );
        drop(dg);
        Ok(out)
    }

    fn ew_unary_scalar(
        &self,
        dst: Option<&Tensor>,
        op: &'static str,
        k: UnScalarKernel,
        c: f32,
    ) -> TensorResult<Tensor> {
        self.check_f32(op)?;
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, op)?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        k(
            f32s_mut(&mut dg, op)?,
            &out.layout(),
            f32s(&sg, op)?,
            &self.layout(),
            &self.shape,
            c,
        );
        drop(dg);
        Ok(out)
    }

    /// Gradient dispatch: self carries the cached forward input or output
    /// (whichever the kernel consumes), `grad_out` the incoming gradient.
    fn ew_grad(
        &self,
        grad_out: &Tensor,
        dst: Option<&Tensor>,
        op: &'static str,
        k: BinKernel,
    ) -> TensorResult<Tensor> {
        self.check_same_shape(grad_out)?;
        // Kernel argument order is (grad_out, cached).
        grad_out.ew_binary(self, dst, op, k)
    }

    fn ew_grad_scalar(
        &self,
        grad_out: &Tensor,
        dst: Option<&Tensor>,
        op: &'static str,
        k: BinScalarKernel,
        c: f32,
    ) -> TensorResult<Tensor> {
        self.check_f32(op)?;
        grad_out.check_f32(op)?;
        self.check_same_shape(grad_out)?;
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, op)?;
        grad_out.check_no_alias(&out, op)?;
        let mut dg = out.buf.write();
        let gg = grad_out.buf.read();
        let xg = self.buf.read();
        k(
            f32s_mut(&mut dg, op)?,
            &out.layout(),
            f32s(&gg, op)?,
            &grad_out.layout(),
            f32s(&xg, op)?,
            &self.layout(),
            &self.shape,
            c,
        );
        drop(dg);
        Ok(out)
    }

    // Element-wise arithmetic.

    pub fn add(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_binary(rhs, dst, "add", elementwise::add)
    }

    pub fn sub(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_binary(rhs, dst, "sub", elementwise::sub)
    }

    pub fn mul(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_binary(rhs, dst, "mul", elementwise::mul)
    }

    pub fn div(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_binary(rhs, dst, "div", elementwise::div)
    }

    /// Element-wise product under its linear-algebra name.
    pub fn hadamard(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_binary(rhs, dst, "hadamard", elementwise::hadamard)
    }

    pub fn neg(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "neg", elementwise::neg)
    }

    pub fn abs(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "abs", elementwise::abs)
    }

    pub fn exp(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "exp", elementwise::exp)
    }

    pub fn log(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "log", elementwise::log)
    }

    pub fn sqrt(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "sqrt", elementwise::sqrt)
    }

    pub fn scale(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "scale", elementwise::scale, c)
    }

    pub fn add_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "add_scalar", elementwise::add_scalar, c)
    }

    pub fn mul_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "mul_scalar", elementwise::mul_scalar, c)
    }

    // Comparison to scalar: 0/1 output.

    pub fn eq_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "eq_scalar", elementwise::eq_scalar, c)
    }

    pub fn ne_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "ne_scalar", elementwise::ne_scalar, c)
    }

    pub fn lt_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "lt_scalar", elementwise::lt_scalar, c)
    }

    pub fn le_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "le_scalar", elementwise::le_scalar, c)
    }

    pub fn gt_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "gt_scalar", elementwise::gt_scalar, c)
    }

    pub fn ge_scalar(&self, c: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "ge_scalar", elementwise::ge_scalar, c)
    }

    // In-place mutation. Writes go through the buffer lock, so a view of
    // a parameter can be filled while other views are held elsewhere.

    /// Fill every addressed element with one value (layout-aware).
    pub fn fill(&self, value: f32) -> TensorResult<()> {
        self.check_f32("fill")?;
        let mut g = self.buf.write();
        let d = f32s_mut(&mut g, "fill")?;
        elementwise::elem_fill(d, &self.layout(), &self.shape, value);
        Ok(())
    }

    /// Fill with zeros. Used by gradient zeroing.
    pub fn zero_fill(&self) -> TensorResult<()> {
        self.fill(0.0)
    }

    /// self += alpha · x, in place.
    pub fn axpy_acc(&self, alpha: f32, x: &Tensor) -> TensorResult<()> {
        self.check_f32("axpy")?;
        x.check_f32("axpy")?;
        self.check_same_shape(x)?;
        let dr = self.contiguous_range("axpy")?;
        let xr = x.contiguous_range("axpy")?;
        if self.id() == x.id() {
            return Err(TensorError::Incompatible("axpy: operands alias".into()));
        }
        let mut dg = self.buf.write();
        let xg = x.buf.read();
        blas::axpy(&mut f32s_mut(&mut dg, "axpy")?[dr], alpha, &f32s(&xg, "axpy")?[xr]);
        Ok(())
    }

    /// self *= alpha, in place.
    pub fn scale_acc(&self, alpha: f32) -> TensorResult<()> {
        self.check_f32("scal")?;
        let r = self.contiguous_range("scal")?;
        let mut g = self.buf.write();
        blas::scal(&mut f32s_mut(&mut g, "scal")?[r], alpha);
        Ok(())
    }

    // Reductions. An empty axis list reduces every axis; reduced axes are
    // removed and a full reduction leaves shape [1].

    fn reduction_out_shape(&self, axes: &[usize], op: &'static str) -> TensorResult<Shape> {
        let rank = self.rank();
        let mut seen = [false; crate::kernels::MAX_RANK];
        for &a in axes {
            if a >= rank || seen[a] {
                return Err(TensorError::Incompatible(format!(
                    "{}: bad reduction axis {} for rank {}",
                    op, a, rank
                )));
            }
            seen[a] = true;
        }
        if axes.is_empty() {
            return Ok(Shape::new(vec![1]));
        }
        let dims: Vec<usize> = self
            .shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !seen[*i])
            .map(|(_, &d)| d)
            .collect();
        Ok(if dims.is_empty() {
            Shape::new(vec![1])
        } else {
            Shape::new(dims)
        })
    }

    fn reduction(
        &self,
        axes: &[usize],
        dst: Option<&Tensor>,
        op: &'static str,
        k: fn(&mut [f32], &[f32], &Layout, &Shape, &[usize]),
    ) -> TensorResult<Tensor> {
        self.check_f32(op)?;
        let out_shape = self.reduction_out_shape(axes, op)?;
        let out = Tensor::resolve_dst(dst, &out_shape)?;
        self.check_no_alias(&out, op)?;
        let all_axes: Vec<usize> = (0..self.rank()).collect();
        let axes = if axes.is_empty() { &all_axes[..] } else { axes };
        let dr = out.contiguous_range(op)?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        k(
            &mut f32s_mut(&mut dg, op)?[dr],
            f32s(&sg, op)?,
            &self.layout(),
            &self.shape,
            axes,
        );
        drop(dg);
        Ok(out)
    }

    /// Sum along the given axes (all axes when empty).
    pub fn sum(&self, axes: &[usize], dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.reduction(axes, dst, "sum", reduce::sum_axes)
    }

    /// Mean along the given axes (all axes when empty).
    pub fn mean(&self, axes: &[usize], dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.reduction(axes, dst, "mean", reduce::mean_axes)
    }

    /// Sum of all elements as a plain scalar.
    pub fn sum_all(&self) -> TensorResult<f32> {
        self.check_f32("sum")?;
        let g = self.buf.read();
        Ok(reduce::sum_all_strided(
            f32s(&g, "sum")?,
            &self.layout(),
            &self.shape,
        ))
    }

    /// Mean of all elements as a plain scalar. 0 for an empty tensor.
    pub fn mean_all(&self) -> TensorResult<f32> {
        let n = self.numel();
        if n == 0 {
            return Ok(0.0);
        }
        Ok(self.sum_all()? / n as f32)
    }

    /// Max along one axis.
    pub fn max_axis(&self, axis: usize, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("max")?;
        let out_shape = self.reduction_out_shape(&[axis], "max")?;
        let out = Tensor::resolve_dst(dst, &out_shape)?;
        self.check_no_alias(&out, "max")?;
        let dr = out.contiguous_range("max")?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        reduce::max_axis(
            &mut f32s_mut(&mut dg, "max")?[dr],
            None,
            f32s(&sg, "max")?,
            &self.layout(),
            &self.shape,
            axis,
        );
        drop(dg);
        Ok(out)
    }

    /// Min along one axis.
    pub fn min_axis(&self, axis: usize, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("min")?;
        let out_shape = self.reduction_out_shape(&[axis], "min")?;
        let out = Tensor::resolve_dst(dst, &out_shape)?;
        self.check_no_alias(&out, "min")?;
        let dr = out.contiguous_range("min")?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        reduce::min_axis(
            &mut f32s_mut(&mut dg, "min")?[dr],
            f32s(&sg, "min")?,
            &self.layout(),
            &self.shape,
            axis,
        );
        drop(dg);
        Ok(out)
    }

    /// Argmax along one axis: I32 tensor of winning coordinates.
    pub fn argmax_axis(&self, axis: usize) -> TensorResult<Tensor> {
        self.check_f32("argmax")?;
        let out_shape = self.reduction_out_shape(&[axis], "argmax")?;
        let mut vals = vec![0.0f32; out_shape.numel()];
        let out = Tensor::new(DataType::I32, out_shape);
        {
            let mut dg = out.buf.write();
            let arg = match &mut *dg {
                Cells::I32(v) => v,
                _ => unreachable!("argmax output allocated as i32"),
            };
            let sg = self.buf.read();
            reduce::max_axis(
                &mut vals,
                Some(arg),
                f32s(&sg, "argmax")?,
                &self.layout(),
                &self.shape,
                axis,
            );
        }
        Ok(out)
    }

    // Activations.

    pub fn relu(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "relu", activation::relu)
    }

    pub fn relu6(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "relu6", activation::relu6)
    }

    pub fn leaky_relu(&self, alpha: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "leaky_relu", activation::leaky_relu, alpha)
    }

    pub fn elu(&self, alpha: f32, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary_scalar(dst, "elu", activation::elu, alpha)
    }

    pub fn sigmoid(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "sigmoid", activation::sigmoid)
    }

    pub fn tanh(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "tanh", activation::tanh)
    }

    pub fn softplus(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "softplus", activation::softplus)
    }

    pub fn swish(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "swish", activation::swish)
    }

    pub fn gelu(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_unary(dst, "gelu", activation::gelu)
    }

    /// Softmax along `axis`. Subtracts the lane maximum before
    /// exponentiation; a zero lane sum is left undivided.
    pub fn softmax(&self, axis: usize, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("softmax")?;
        if axis >= self.rank().max(1) {
            return Err(TensorError::Incompatible(format!(
                "softmax: axis {} out of range for rank {}",
                axis,
                self.rank()
            )));
        }
        if !self.is_contiguous() {
            let c = self.to_contiguous()?;
            return c.softmax(axis, dst);
        }
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, "softmax")?;
        let n = self.numel();
        let dr = out.contiguous_range("softmax")?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        let dims = if self.rank() == 0 { &[1usize][..] } else { self.shape.dims() };
        activation::softmax(
            &mut f32s_mut(&mut dg, "softmax")?[dr],
            &f32s(&sg, "softmax")?[self.offset..self.offset + n],
            dims,
            axis,
        );
        drop(dg);
        Ok(out)
    }

    // Activation gradients. Self carries the cached forward input (ReLU
    // family) or forward output (sigmoid/tanh/softmax).

    pub fn relu_backward(&self, grad_out: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "relu_backward", activation::relu_grad)
    }

    pub fn relu6_backward(&self, grad_out: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "relu6_backward", activation::relu6_grad)
    }

    pub fn leaky_relu_backward(
        &self,
        grad_out: &Tensor,
        alpha: f32,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.ew_grad_scalar(
            grad_out,
            dst,
            "leaky_relu_backward",
            activation::leaky_relu_grad,
            alpha,
        )
    }

    pub fn elu_backward(
        &self,
        grad_out: &Tensor,
        alpha: f32,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.ew_grad_scalar(grad_out, dst, "elu_backward", activation::elu_grad, alpha)
    }

    pub fn sigmoid_backward(
        &self,
        grad_out: &Tensor,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "sigmoid_backward", activation::sigmoid_grad)
    }

    pub fn tanh_backward(&self, grad_out: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "tanh_backward", activation::tanh_grad)
    }

    pub fn softplus_backward(
        &self,
        grad_out: &Tensor,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "softplus_backward", activation::softplus_grad)
    }

    pub fn swish_backward(&self, grad_out: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "swish_backward", activation::swish_grad)
    }

    pub fn gelu_backward(&self, grad_out: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.ew_grad(grad_out, dst, "gelu_backward", activation::gelu_grad)
    }

    /// Softmax gradient from the forward output (self).
    pub fn softmax_backward(
        &self,
        grad_out: &Tensor,
        axis: usize,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("softmax_backward")?;
        grad_out.check_f32("softmax_backward")?;
        self.check_same_shape(grad_out)?;
        if !self.is_contiguous() || !grad_out.is_contiguous() {
            let y = self.to_contiguous()?;
            let g = grad_out.to_contiguous()?;
            return y.softmax_backward(&g, axis, dst);
        }
        let out = Tensor::resolve_dst(dst, &self.shape)?;
        self.check_no_alias(&out, "softmax_backward")?;
        grad_out.check_no_alias(&out, "softmax_backward")?;
        let n = self.numel();
        let dr = out.contiguous_range("softmax_backward")?;
        let mut dg = out.buf.write();
        let gg = grad_out.buf.read();
        let yg = self.buf.read();
        let dims = if self.rank() == 0 { &[1usize][..] } else { self.shape.dims() };
        activation::softmax_grad(
            &mut f32s_mut(&mut dg, "softmax_backward")?[dr],
            &f32s(&gg, "softmax_backward")?[grad_out.offset..grad_out.offset + n],
            &f32s(&yg, "softmax_backward")?[self.offset..self.offset + n],
            dims,
            axis,
        );
        drop(dg);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(data: Vec<f32>, dims: Vec<usize>) -> Tensor {
        Tensor::from_vec(data, Shape::new(dims)).unwrap()
    }

    #[test]
    fn add_into_destination_reuses_buffer() {
        let a = t(vec![1.0, 2.0], vec![2]);
        let b = t(vec![3.0, 4.0], vec![2]);
        let dst = Tensor::new(DataType::F32, Shape::new(vec![2]));
        let dst_id = dst.id();
        let out = a.add(&b, Some(&dst)).unwrap();
        assert_eq!(out.id(), dst_id);
        assert_eq!(out.to_vec().unwrap(), vec![4.0, 6.0]);
    }

    #[test]
    fn destination_shape_is_verified() {
        let a = t(vec![1.0, 2.0], vec![2]);
        let b = t(vec![3.0, 4.0], vec![2]);
        let bad = Tensor::new(DataType::F32, Shape::new(vec![3]));
        assert!(matches!(
            a.add(&b, Some(&bad)),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn shape_mismatch_rejected() {
        let a = t(vec![1.0, 2.0], vec![2]);
        let b = t(vec![1.0, 2.0, 3.0], vec![3]);
        assert!(a.add(&b, None).is_err());
    }

    #[test]
    fn sum_mean_axes() {
        let m = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        assert_eq!(m.sum(&[0], None).unwrap().to_vec().unwrap(), vec![5.0, 7.0, 9.0]);
        assert_eq!(m.sum(&[1], None).unwrap().to_vec().unwrap(), vec![6.0, 15.0]);
        let all = m.mean(&[], None).unwrap();
        assert_eq!(all.shape().dims(), &[1]);
        assert_relative_eq!(all.at(&[0]).unwrap(), 3.5);
    }

    #[test]
    fn argmax_yields_i32() {
        let m = t(vec![1.0, 9.0, 3.0, 7.0, 5.0, 2.0], vec![2, 3]);
        let a = m.argmax_axis(1).unwrap();
        assert_eq!(a.dtype(), DataType::I32);
        assert_eq!(a.to_vec_i32().unwrap(), vec![1, 0]);
    }

    #[test]
    fn softmax_scenario_1d() {
        let x = t(vec![1.0, 2.0, 3.0], vec![3]);
        let y = x.softmax(0, None).unwrap();
        let v = y.to_vec().unwrap();
        let sum: f32 = v.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        assert!(v[2] > v[1] && v[1] > v[0]);
        assert!(v.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn strided_operand_takes_slow_path() {
        // Row view of a matrix through subtensor has an offset.
        let m = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let row = m.subtensor(1).unwrap();
        let out = row.add_scalar(10.0, None).unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![14.0, 15.0, 16.0]);
    }

    #[test]
    fn in_place_axpy() {
        let y = t(vec![1.0, 2.0], vec![2]);
        let x = t(vec![10.0, 20.0], vec![2]);
        y.axpy_acc(0.5, &x).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![6.0, 12.0]);
        y.zero_fill().unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![0.0, 0.0]);
    }
}
