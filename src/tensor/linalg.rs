//! Linear-algebra methods: matrix products, rank-1/transposed accumulation
//! used by dense gradients, and the decomposition surface (inverse, QR,
//! SVD, pseudo-inverse). Operands are made contiguous before dispatching
//! to the BLAS-style kernels.

use super::{f32s, f32s_mut, Tensor, TensorError, TensorResult};
use crate::kernels::{blas, decomp};
use crate::shape::Shape;

impl Tensor {
    fn mat_dims(&self, op: &'static str) -> TensorResult<(usize, usize)> {
        if self.rank() != 2 {
            return Err(TensorError::Incompatible(format!(
                "{}: requires a rank-2 tensor, got rank {}",
                op,
                self.rank()
            )));
        }
        let d = self.shape.dims();
        Ok((d[0], d[1]))
    }

    /// Matrix product: self (m×k) · rhs (k×n) -> (m×n).
    pub fn matmul(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("matmul")?;
        rhs.check_f32("matmul")?;
        let (m, k1) = self.mat_dims("matmul")?;
        let (k2, n) = rhs.mat_dims("matmul")?;
        if k1 != k2 {
            return Err(TensorError::Incompatible(format!(
                "matmul: inner dims {} != {}",
                k1, k2
            )));
        }
        if !self.is_contiguous() {
            return self.to_contiguous()?.matmul(rhs, dst);
        }
        if !rhs.is_contiguous() {
            return self.matmul(&rhs.to_contiguous()?, dst);
        }
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![m, n]))?;
        self.check_no_alias(&out, "matmul")?;
        rhs.check_no_alias(&out, "matmul")?;
        let dr = out.contiguous_range("matmul")?;
        let ar = self.contiguous_range("matmul")?;
        let br = rhs.contiguous_range("matmul")?;
        let mut dg = out.buf.write();
        let ag = self.buf.read();
        let bg = rhs.buf.read();
        blas::gemm_nn(
            &mut f32s_mut(&mut dg, "matmul")?[dr],
            &f32s(&ag, "matmul")?[ar],
            &f32s(&bg, "matmul")?[br],
            m,
            k1,
            n,
        );
        drop(dg);
        Ok(out)
    }

    /// self (m×k) · rhsᵀ for rhs (n×k) -> (m×n). The gradient-w.r.t.-input
    /// product of a dense layer.
    pub fn matmul_nt(&self, rhs: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("matmul_nt")?;
        rhs.check_f32("matmul_nt")?;
        let (m, k1) = self.mat_dims("matmul_nt")?;
        let (n, k2) = rhs.mat_dims("matmul_nt")?;
        if k1 != k2 {
            return Err(TensorError::Incompatible(format!(
                "matmul_nt: inner dims {} != {}",
                k1, k2
            )));
        }
        if !self.is_contiguous() {
            return self.to_contiguous()?.matmul_nt(rhs, dst);
        }
        if !rhs.is_contiguous() {
            return self.matmul_nt(&rhs.to_contiguous()?, dst);
        }
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![m, n]))?;
        self.check_no_alias(&out, "matmul_nt")?;
        rhs.check_no_alias(&out, "matmul_nt")?;
        let dr = out.contiguous_range("matmul_nt")?;
        let ar = self.contiguous_range("matmul_nt")?;
        let br = rhs.contiguous_range("matmul_nt")?;
        let mut dg = out.buf.write();
        let ag = self.buf.read();
        let bg = rhs.buf.read();
        blas::gemm_nt(
            &mut f32s_mut(&mut dg, "matmul_nt")?[dr],
            &f32s(&ag, "matmul_nt")?[ar],
            &f32s(&bg, "matmul_nt")?[br],
            m,
            k1,
            n,
        );
        drop(dg);
        Ok(out)
    }

    /// self (m×n) += aᵀ · b for a (k×m), b (k×n). Accumulating product
    /// used for weight gradients.
    pub fn acc_matmul_tn(&self, a: &Tensor, b: &Tensor) -> TensorResult<()> {
        self.check_f32("acc_matmul_tn")?;
        a.check_f32("acc_matmul_tn")?;
        b.check_f32("acc_matmul_tn")?;
        let (m, n) = self.mat_dims("acc_matmul_tn")?;
        let (k1, m2) = a.mat_dims("acc_matmul_tn")?;
        let (k2, n2) = b.mat_dims("acc_matmul_tn")?;
        if m2 != m || n2 != n || k1 != k2 {
            return Err(TensorError::Incompatible(
                "acc_matmul_tn: operand dims do not agree".into(),
            ));
        }
        let a = a.to_contiguous()?;
        let b = b.to_contiguous()?;
        let dr = self.contiguous_range("acc_matmul_tn")?;
        let ar = a.contiguous_range("acc_matmul_tn")?;
        let br = b.contiguous_range("acc_matmul_tn")?;
        let mut dg = self.buf.write();
        let ag = a.buf.read();
        let bg = b.buf.read();
        blas::gemm_tn_acc(
            &mut f32s_mut(&mut dg, "acc_matmul_tn")?[dr],
            &f32s(&ag, "acc_matmul_tn")?[ar],
            &f32s(&bg, "acc_matmul_tn")?[br],
            m,
            k1,
            n,
        );
        Ok(())
    }

    /// Matrix-vector product: self (m×n) · x (n) -> (m).
    pub fn matvec(&self, x: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.gemv(x, dst, false)
    }

    /// Transposed matrix-vector product: selfᵀ (n×m view of m×n) · x -> (n).
    pub fn matvec_t(&self, x: &Tensor, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.gemv(x, dst, true)
    }

    fn gemv(&self, x: &Tensor, dst: Option<&Tensor>, transposed: bool) -> TensorResult<Tensor> {
        let op = if transposed { "matvec_t" } else { "matvec" };
        self.check_f32(op)?;
        x.check_f32(op)?;
        let (m, n) = self.mat_dims(op)?;
        let (expect_in, out_len) = if transposed { (m, n) } else { (n, m) };
        if x.rank() != 1 || x.shape.dims()[0] != expect_in {
            return Err(TensorError::Incompatible(format!(
                "{}: vector length {:?} does not match matrix {}x{}",
                op,
                x.shape.dims(),
                m,
                n
            )));
        }
        if !self.is_contiguous() {
            return self.to_contiguous()?.gemv(x, dst, transposed);
        }
        let x = x.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![out_len]))?;
        self.check_no_alias(&out, op)?;
        x.check_no_alias(&out, op)?;
        let dr = out.contiguous_range(op)?;
        let ar = self.contiguous_range(op)?;
        let xr = x.contiguous_range(op)?;
        let mut dg = out.buf.write();
        let ag = self.buf.read();
        let xg = x.buf.read();
        let (d, a, xv) = (
            &mut f32s_mut(&mut dg, op)?[dr],
            &f32s(&ag, op)?[ar],
            &f32s(&xg, op)?[xr],
        );
        if transposed {
            blas::gemv_t(d, a, xv, m, n);
        } else {
            blas::gemv_n(d, a, xv, m, n);
        }
        drop(dg);
        Ok(out)
    }

    /// self (m×n) += alpha · x (m) · yᵀ (n). Rank-1 accumulation used for
    /// single-sample weight gradients.
    pub fn acc_outer(&self, alpha: f32, x: &Tensor, y: &Tensor) -> TensorResult<()> {
        self.check_f32("acc_outer")?;
        x.check_f32("acc_outer")?;
        y.check_f32("acc_outer")?;
        let (m, n) = self.mat_dims("acc_outer")?;
        if x.rank() != 1 || y.rank() != 1 || x.numel() != m || y.numel() != n {
            return Err(TensorError::Incompatible(
                "acc_outer: vector lengths do not match matrix".into(),
            ));
        }
        let x = x.to_contiguous()?;
        let y = y.to_contiguous()?;
        let dr = self.contiguous_range("acc_outer")?;
        let xr = x.contiguous_range("acc_outer")?;
        let yr = y.contiguous_range("acc_outer")?;
        let mut dg = self.buf.write();
        let xg = x.buf.read();
        let yg = y.buf.read();
        blas::ger_acc(
            &mut f32s_mut(&mut dg, "acc_outer")?[dr],
            alpha,
            &f32s(&xg, "acc_outer")?[xr],
            &f32s(&yg, "acc_outer")?[yr],
            m,
            n,
        );
        Ok(())
    }

    /// Dot product of two rank-1 tensors.
    pub fn dot(&self, rhs: &Tensor) -> TensorResult<f32> {
        self.check_f32("dot")?;
        rhs.check_f32("dot")?;
        self.check_same_shape(rhs)?;
        if self.rank() != 1 {
            return Err(TensorError::Incompatible(
                "dot: requires rank-1 tensors".into(),
            ));
        }
        let a = self.to_contiguous()?;
        let b = rhs.to_contiguous()?;
        let ar = a.contiguous_range("dot")?;
        let br = b.contiguous_range("dot")?;
        let ag = a.buf.read();
        if a.id() == b.id() {
            let s = f32s(&ag, "dot")?;
            return Ok(blas::dot(&s[ar], &s[br]));
        }
        let bg = b.buf.read();
        Ok(blas::dot(&f32s(&ag, "dot")?[ar], &f32s(&bg, "dot")?[br]))
    }

    /// Transposed copy of a rank-2 tensor.
    pub fn transpose(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("transpose")?;
        let (m, n) = self.mat_dims("transpose")?;
        if !self.is_contiguous() {
            return self.to_contiguous()?.transpose(dst);
        }
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, m]))?;
        self.check_no_alias(&out, "transpose")?;
        let dr = out.contiguous_range("transpose")?;
        let sr = self.contiguous_range("transpose")?;
        let mut dg = out.buf.write();
        let sg = self.buf.read();
        blas::transpose(
            &mut f32s_mut(&mut dg, "transpose")?[dr],
            &f32s(&sg, "transpose")?[sr],
            m,
            n,
        );
        drop(dg);
        Ok(out)
    }

    /// Matrix inverse via LU with partial pivoting. Fails on singularity.
    pub fn inverse(&self) -> TensorResult<Tensor> {
        self.check_f32("inverse")?;
        let (m, n) = self.mat_dims("inverse")?;
        if m != n {
            return Err(TensorError::Incompatible(
                "inverse: requires a square matrix".into(),
            ));
        }
        let mut lu = self.to_vec()?;
        let mut piv = vec![0usize; n];
        decomp::getrf(&mut lu, n, &mut piv)?;
        let out = Tensor::new(crate::dtype::DataType::F32, self.shape.clone());
        {
            let dr = out.contiguous_range("inverse")?;
            let mut dg = out.buf.write();
            decomp::getri(&lu, n, &piv, &mut f32s_mut(&mut dg, "inverse")?[dr])?;
        }
        Ok(out)
    }

    /// Thin QR decomposition (m ≥ n): returns (Q m×n, R n×n).
    pub fn qr(&self) -> TensorResult<(Tensor, Tensor)> {
        self.check_f32("qr")?;
        let (m, n) = self.mat_dims("qr")?;
        let mut a = self.to_vec()?;
        let mut tau = vec![0.0f32; n];
        decomp::geqrf(&mut a, m, n, &mut tau)?;
        let mut q = vec![0.0f32; m * n];
        decomp::orgqr(&mut q, &a, m, n, &tau);
        let mut r = vec![0.0f32; n * n];
        for i in 0..n {
            for j in i..n {
                r[i * n + j] = a[i * n + j];
            }
        }
        Ok((
            Tensor::from_vec(q, Shape::new(vec![m, n]))?,
            Tensor::from_vec(r, Shape::new(vec![n, n]))?,
        ))
    }

    /// Singular value decomposition (m ≥ n): returns (U m×n, s n, Vᵀ n×n).
    pub fn svd(&self) -> TensorResult<(Tensor, Tensor, Tensor)> {
        self.check_f32("svd")?;
        let (m, n) = self.mat_dims("svd")?;
        let a = self.to_vec()?;
        let mut u = vec![0.0f32; m * n];
        let mut s = vec![0.0f32; n];
        let mut vt = vec![0.0f32; n * n];
        decomp::gesvd(&a, m, n, &mut u, &mut s, &mut vt)?;
        Ok((
            Tensor::from_vec(u, Shape::new(vec![m, n]))?,
            Tensor::from_vec(s, Shape::new(vec![n]))?,
            Tensor::from_vec(vt, Shape::new(vec![n, n]))?,
        ))
    }

    /// Moore-Penrose pseudo-inverse (n×m for an m×n input).
    pub fn pinv(&self) -> TensorResult<Tensor> {
        self.check_f32("pinv")?;
        let (m, n) = self.mat_dims("pinv")?;
        let a = self.to_vec()?;
        let mut p = vec![0.0f32; n * m];
        decomp::gepseu(&mut p, &a, m, n)?;
        Tensor::from_vec(p, Shape::new(vec![n, m]))
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
    fn matmul_2x2() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = t(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
        let c = a.matmul(&b, None).unwrap();
        assert_eq!(c.to_vec().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matvec_orientations() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let y = a.matvec(&t(vec![1.0, 1.0, 1.0], vec![3]), None).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![6.0, 15.0]);
        let yt = a.matvec_t(&t(vec![1.0, 1.0], vec![2]), None).unwrap();
        assert_eq!(yt.to_vec().unwrap(), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn transpose_round_trip() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let at = a.transpose(None).unwrap();
        assert_eq!(at.shape().dims(), &[3, 2]);
        let back = at.transpose(None).unwrap();
        assert_eq!(back.to_vec().unwrap(), a.to_vec().unwrap());
    }

    #[test]
    fn inverse_identity() {
        let a = t(vec![4.0, 7.0, 2.0, 6.0], vec![2, 2]);
        let inv = a.inverse().unwrap();
        let id = a.matmul(&inv, None).unwrap();
        let v = id.to_vec().unwrap();
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-4);
        assert_relative_eq!(v[3], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn pinv_of_tall_matrix_is_left_inverse() {
        let a = t(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
        let p = a.pinv().unwrap();
        assert_eq!(p.shape().dims(), &[2, 3]);
        let id = p.matmul(&a, None).unwrap();
        let v = id.to_vec().unwrap();
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-3);
        assert_relative_eq!(v[2], 0.0, epsilon = 1e-3);
        assert_relative_eq!(v[3], 1.0, epsilon = 1e-3);
    }
}
