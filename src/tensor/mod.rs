//! Tensor: a shape + dtype + strides + offset handle over a
//! reference-counted buffer. Views share the buffer and bump the count;
//! `Clone` is a deep copy into a fresh buffer. All numeric ops dispatch to
//! the kernel layer and either allocate their result or write into a
//! caller-supplied destination of exactly the computed shape.

mod conv;
mod linalg;
mod math;

use crate::dtype::DataType;
use crate::kernels::{self, Layout};
use crate::shape::{Shape, ShapeError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: Shape, found: Shape },
    #[error("shape mismatch: {0}")]
    Incompatible(String),
    #[error("{op}: dtype {dtype} not supported")]
    UnsupportedDType { op: &'static str, dtype: DataType },
    #[error("index {index:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Shape },
    #[error("kernel error: {0}")]
    Kernel(#[from] kernels::KernelError),
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),
}

pub type TensorResult<T> = Result<T, TensorError>;

/// Stable identity of a buffer: issued once at allocation, shared by every
/// view, never reused for the lifetime of the process.
pub type BufferId = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Typed element storage.
pub(crate) enum Cells {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl Cells {
    fn zeroed(dtype: DataType, len: usize) -> Cells {
        match dtype {
            DataType::F32 => Cells::F32(vec![0.0; len]),
            DataType::I32 => Cells::I32(vec![0; len]),
            DataType::U8 => Cells::U8(vec![0; len]),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Cells::F32(v) => v.len(),
            Cells::I32(v) => v.len(),
            Cells::U8(v) => v.len(),
        }
    }

    fn deep_clone(&self) -> Cells {
        match self {
            Cells::F32(v) => Cells::F32(v.clone()),
            Cells::I32(v) => Cells::I32(v.clone()),
            Cells::U8(v) => Cells::U8(v.clone()),
        }
    }
}

pub(crate) struct Buffer {
    id: BufferId,
    cells: RwLock<Cells>,
}

impl Buffer {
    fn new(cells: Cells) -> Arc<Buffer> {
        Arc::new(Buffer {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            cells: RwLock::new(cells),
        })
    }

    /// Read lock. A poisoned lock is recovered: the cells are plain
    /// numbers and stay well-formed across a writer panic.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Cells> {
        self.cells.read().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Cells> {
        self.cells.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Borrow the FP32 cells or fail with the op name.
pub(crate) fn f32s<'a>(cells: &'a Cells, op: &'static str) -> TensorResult<&'a [f32]> {
    match cells {
        Cells::F32(v) => Ok(v),
        Cells::I32(_) => Err(TensorError::UnsupportedDType {
            op,
            dtype: DataType::I32,
        }),
        Cells::U8(_) => Err(TensorError::UnsupportedDType {
            op,
            dtype: DataType::U8,
        }),
    }
}

pub(crate) fn f32s_mut<'a>(cells: &'a mut Cells, op: &'static str) -> TensorResult<&'a mut [f32]> {
    match cells {
        Cells::F32(v) => Ok(v),
        Cells::I32(_) => Err(TensorError::UnsupportedDType {
            op,
            dtype: DataType::I32,
        }),
        Cells::U8(_) => Err(TensorError::UnsupportedDType {
            op,
            dtype: DataType::U8,
        }),
    }
}

/// Tensor handle. Cheap to view, explicit to deep-copy.
pub struct Tensor {
    shape: Shape,
    dtype: DataType,
    /// None denotes canonical row-major strides for `shape`.
    strides: Option<Vec<usize>>,
    /// Element index into the buffer at which this view starts.
    offset: usize,
    buf: Arc<Buffer>,
}

impl Tensor {
    /// Zero-filled tensor of the given dtype and shape.
    pub fn new(dtype: DataType, shape: Shape) -> Tensor {
        let len = shape.numel();
        Tensor {
            shape,
            dtype,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::zeroed(dtype, len)),
        }
    }

    /// FP32 tensor adopting a flat data vector.
    /// Fails when data length does not match the shape's element count.
    pub fn from_vec(data: Vec<f32>, shape: Shape) -> TensorResult<Tensor> {
        if data.len() != shape.numel() {
            return Err(TensorError::Shape(ShapeError(format!(
                "data len {} != shape numel {}",
                data.len(),
                shape.numel()
            ))));
        }
        Ok(Tensor {
            shape,
            dtype: DataType::F32,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::F32(data)),
        })
    }

    /// I32 tensor adopting a flat data vector.
    pub fn from_vec_i32(data: Vec<i32>, shape: Shape) -> TensorResult<Tensor> {
        if data.len() != shape.numel() {
            return Err(TensorError::Shape(ShapeError(format!(
                "data len {} != shape numel {}",
                data.len(),
                shape.numel()
            ))));
        }
        Ok(Tensor {
            shape,
            dtype: DataType::I32,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::I32(data)),
        })
    }

    /// Rank-0 FP32 scalar.
    pub fn scalar(value: f32) -> Tensor {
        Tensor {
            shape: Shape::scalar(),
            dtype: DataType::F32,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::F32(vec![value])),
        }
    }

    /// Tensor with no buffer contents: the nil sentinel.
    pub fn empty(dtype: DataType) -> Tensor {
        Tensor {
            shape: Shape::scalar(),
            dtype,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::zeroed(dtype, 0)),
        }
    }

    /// Square matrix with `diag` on the diagonal, zero elsewhere.
    pub fn from_diagonal(diag: &[f32]) -> Tensor {
        let n = diag.len();
        let mut data = vec![0.0f32; n * n];
        for (i, &v) in diag.iter().enumerate() {
            data[i * n + i] = v;
        }
        Tensor {
            shape: Shape::new(vec![n, n]),
            dtype: DataType::F32,
            strides: None,
            offset: 0,
            buf: Buffer::new(Cells::F32(data)),
        }
    }

    // Introspection.

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Materialized strides: custom when present, canonical otherwise.
    pub fn strides(&self) -> Vec<usize> {
        match &self.strides {
            Some(s) => s.clone(),
            None => self.shape.canonical_strides(),
        }
    }

    /// True when strides equal the canonical strides of the shape.
    pub fn is_contiguous(&self) -> bool {
        match &self.strides {
            None => true,
            Some(s) => kernels::strides_are_canonical(s, self.shape.dims()),
        }
    }

    /// Stable identity of the underlying buffer; shared by views, fresh
    /// after `Clone`.
    pub fn id(&self) -> BufferId {
        self.buf.id
    }

    /// Number of live handles sharing the buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    /// True when the tensor has no buffer contents.
    pub fn is_empty(&self) -> bool {
        self.buf.read().len() == 0
    }

    pub(crate) fn layout(&self) -> Layout<'_> {
        Layout {
            offset: self.offset,
            strides: self.strides.as_deref(),
        }
    }

    // Views and copies.

    /// Non-owning alias: shares the buffer (bumps the reference count)
    /// and carries its own shape/strides/offset. Dropping the view
    /// releases its share.
    pub fn view(&self) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            dtype: self.dtype,
            strides: self.strides.clone(),
            offset: self.offset,
            buf: Arc::clone(&self.buf),
        }
    }

    /// View of the sub-tensor at `index` along axis 0: shape drops the
    /// leading axis, offset advances by `index · stride₀`.
    pub fn subtensor(&self, index: usize) -> TensorResult<Tensor> {
        if self.rank() == 0 || index >= self.shape.dims()[0] {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![index],
                shape: self.shape.clone(),
            });
        }
        let strides = self.strides();
        Ok(Tensor {
            shape: Shape::new(self.shape.dims()[1..].to_vec()),
            dtype: self.dtype,
            strides: if self.is_contiguous() {
                None
            } else {
                Some(strides[1..].to_vec())
            },
            offset: self.offset + index * strides[0],
            buf: Arc::clone(&self.buf),
        })
    }

    /// Size-preserving view with a new shape. Requires a contiguous
    /// tensor; the buffer is shared.
    pub fn reshape(&self, shape: Shape) -> TensorResult<Tensor> {
        if shape.numel() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.clone(),
                found: shape,
            });
        }
        if !self.is_contiguous() {
            return Err(TensorError::Incompatible(
                "reshape: tensor is not contiguous".into(),
            ));
        }
        Ok(Tensor {
            shape,
            dtype: self.dtype,
            strides: None,
            offset: self.offset,
            buf: Arc::clone(&self.buf),
        })
    }

    /// Contiguous canonical copy of the logical elements (self when
    /// already contiguous: returns a view).
    pub fn to_contiguous(&self) -> TensorResult<Tensor> {
        if self.is_contiguous() {
            return Ok(self.view());
        }
        let out = Tensor::new(DataType::F32, self.shape.clone());
        out.copy_from(self)?;
        Ok(out)
    }

    /// Overwrite the logical elements of `self` with those of `src`.
    /// Shapes must match exactly; layouts may differ.
    pub fn copy_from(&self, src: &Tensor) -> TensorResult<()> {
        if !self.shape.same_as(&src.shape) {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.clone(),
                found: src.shape.clone(),
            });
        }
        if self.id() == src.id() {
            return Err(TensorError::Incompatible(
                "copy_from: source aliases destination".into(),
            ));
        }
        let mut dg = self.buf.write();
        let sg = src.buf.read();
        let d = f32s_mut(&mut dg, "copy_from")?;
        let s = f32s(&sg, "copy_from")?;
        kernels::elementwise::elem_copy(d, &self.layout(), s, &src.layout(), &self.shape);
        Ok(())
    }

    // Element access.

    /// Element at a multi-index, converted to f32. Rank-0 takes the empty
    /// index.
    pub fn at(&self, index: &[usize]) -> TensorResult<f32> {
        let at = self.element_offset(index)?;
        let g = self.buf.read();
        Ok(match &*g {
            Cells::F32(v) => v[at],
            Cells::I32(v) => v[at] as f32,
            Cells::U8(v) => v[at] as f32,
        })
    }

    /// Store a value (converted to the tensor's dtype) at a multi-index.
    pub fn set_at(&self, index: &[usize], value: f32) -> TensorResult<()> {
        let at = self.element_offset(index)?;
        let mut g = self.buf.write();
        match &mut *g {
            Cells::F32(v) => v[at] = value,
            Cells::I32(v) => v[at] = value as i32,
            Cells::U8(v) => v[at] = value as u8,
        }
        Ok(())
    }

    fn element_offset(&self, index: &[usize]) -> TensorResult<usize> {
        if index.len() != self.rank()
            || index
                .iter()
                .zip(self.shape.dims().iter())
                .any(|(&i, &d)| i >= d)
        {
            return Err(TensorError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let at = match &self.strides {
            Some(s) => self.offset + Shape::offset_of(index, s),
            None => self.offset + self.shape.linear_index(index).unwrap_or(0),
        };
        Ok(at)
    }

    /// Visit every logical element in row-major order, optionally with
    /// chosen axes fixed. The callback receives the multi-index and the
    /// element value.
    pub fn for_each_element(
        &self,
        fixed: &[(usize, usize)],
        mut f: impl FnMut(&[usize], f32),
    ) -> TensorResult<()> {
        let g = self.buf.read();
        let data = f32s(&g, "for_each_element")?;
        let strides = self.strides();
        let mut it = self.shape.index_iter_fixed(fixed);
        while let Some(idx) = it.next_index() {
            f(idx, data[self.offset + Shape::offset_of(idx, &strides)]);
        }
        Ok(())
    }

    /// Mutable variant of [`Tensor::for_each_element`]: the callback can
    /// rewrite each visited element in place.
    pub fn for_each_element_mut(
        &self,
        fixed: &[(usize, usize)],
        mut f: impl FnMut(&[usize], &mut f32),
    ) -> TensorResult<()> {
        let mut g = self.buf.write();
        let data = f32s_mut(&mut g, "for_each_element_mut")?;
        let strides = self.strides();
        let mut it = self.shape.index_iter_fixed(fixed);
        while let Some(idx) = it.next_index() {
            f(idx, &mut data[self.offset + Shape::offset_of(idx, &strides)]);
        }
        Ok(())
    }

    // Data access.

    /// Copy of the full FP32 buffer starting at element zero.
    pub fn data(&self) -> TensorResult<Vec<f32>> {
        let g = self.buf.read();
        Ok(f32s(&g, "data")?.to_vec())
    }

    /// Copy of the FP32 buffer starting at this view's offset.
    pub fn data_with_offset(&self) -> TensorResult<Vec<f32>> {
        let g = self.buf.read();
        Ok(f32s(&g, "data_with_offset")?[self.offset..].to_vec())
    }

    /// Copy of the logical elements in row-major order (layout-resolved).
    pub fn to_vec(&self) -> TensorResult<Vec<f32>> {
        if self.is_contiguous() {
            let g = self.buf.read();
            let d = f32s(&g, "to_vec")?;
            return Ok(d[self.offset..self.offset + self.numel()].to_vec());
        }
        let mut out = Vec::with_capacity(self.numel());
        self.for_each_element(&[], |_, v| out.push(v))?;
        Ok(out)
    }

    /// Copy of an I32 buffer's elements (contiguous view).
    pub fn to_vec_i32(&self) -> TensorResult<Vec<i32>> {
        let g = self.buf.read();
        match &*g {
            Cells::I32(v) => Ok(v[self.offset..self.offset + self.numel()].to_vec()),
            _ => Err(TensorError::UnsupportedDType {
                op: "to_vec_i32",
                dtype: self.dtype,
            }),
        }
    }

    // Destination plumbing shared by the op methods.

    /// Resolve an optional destination: verify its shape (and dtype)
    /// exactly matches the computed output shape and reuse it, or
    /// allocate a fresh zeroed tensor.
    pub(crate) fn resolve_dst(dst: Option<&Tensor>, shape: &Shape) -> TensorResult<Tensor> {
        match dst {
            Some(d) => {
                if !d.shape.same_as(shape) {
                    return Err(TensorError::ShapeMismatch {
                        expected: shape.clone(),
                        found: d.shape.clone(),
                    });
                }
                if d.dtype != DataType::F32 {
                    return Err(TensorError::UnsupportedDType {
                        op: "destination",
                        dtype: d.dtype,
                    });
                }
                Ok(d.view())
            }
            None => Ok(Tensor::new(DataType::F32, shape.clone())),
        }
    }

    /// Buffer range of the logical elements of a contiguous tensor.
    pub(crate) fn contiguous_range(
        &self,
        op: &'static str,
    ) -> TensorResult<std::ops::Range<usize>> {
        if !self.is_contiguous() {
            return Err(TensorError::Incompatible(format!(
                "{}: requires a contiguous tensor",
                op
            )));
        }
        Ok(self.offset..self.offset + self.numel())
    }

    /// Mutable access to self's elements alongside read access to another
    /// tensor's. The two must not alias.
    pub(crate) fn with_data_pair_mut<R>(
        &self,
        src: &Tensor,
        op: &'static str,
        f: impl FnOnce(&mut [f32], &[f32]) -> R,
    ) -> TensorResult<R> {
        if self.id() == src.id() {
            return Err(TensorError::Incompatible(format!(
                "{}: operands alias",
                op
            )));
        }
        let dr = self.contiguous_range(op)?;
        let sr = src.contiguous_range(op)?;
        let mut dg = self.buf.write();
        let sg = src.buf.read();
        Ok(f(&mut f32s_mut(&mut dg, op)?[dr], &f32s(&sg, op)?[sr]))
    }

    pub(crate) fn check_no_alias(&self, out: &Tensor, op: &'static str) -> TensorResult<()> {
        if self.id() == out.id() {
            return Err(TensorError::Incompatible(format!(
                "{}: destination aliases an operand",
                op
            )));
        }
        Ok(())
    }

    pub(crate) fn check_f32(&self, op: &'static str) -> TensorResult<()> {
        if self.dtype != DataType::F32 {
            return Err(TensorError::UnsupportedDType {
                op,
                dtype: self.dtype,
            });
        }
        Ok(())
    }

    pub(crate) fn check_same_shape(&self, rhs: &Tensor) -> TensorResult<()> {
        if !self.shape.same_as(&rhs.shape) {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.clone(),
                found: rhs.shape.clone(),
            });
        }
        Ok(())
    }
}

/// Deep copy: fresh buffer, fresh id, reference count 1. Shape, strides,
/// and offset carry over so the copy addresses identical elements.
impl Clone for Tensor {
    fn clone(&self) -> Tensor {
        let g = self.buf.read();
        Tensor {
            shape: self.shape.clone(),
            dtype: self.dtype,
            strides: self.strides.clone(),
            offset: self.offset,
            buf: Buffer::new(g.deep_clone()),
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("offset", &self.offset)
            .field("contiguous", &self.is_contiguous())
            .field("id", &self.buf.id)
            .finish()
    }
}
