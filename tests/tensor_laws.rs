//! Tensor-layer invariants: element addressing through strides, deep-copy
//! semantics, view accounting, and round-trip laws.

use nncore::{DataType, Shape, Tensor};

#[test]
fn at_equals_stride_arithmetic_for_every_index() {
    let t = Tensor::from_vec(
        (0..120).map(|v| v as f32).collect(),
        Shape::new(vec![2, 3, 4, 5]),
    )
    .unwrap();
    let strides = t.strides();
    let data = t.data().unwrap();
    let mut it = t.shape().index_iter();
    let mut indices = Vec::new();
    while let Some(idx) = it.next_index() {
        indices.push(idx.to_vec());
    }
    assert_eq!(indices.len(), 120);
    for idx in indices {
        let flat: usize = idx
            .iter()
            .zip(strides.iter())
            .map(|(&i, &s)| i * s)
            .sum();
        assert_eq!(t.at(&idx).unwrap(), data[t.offset() + flat]);
    }
}

#[test]
fn clone_is_deep_and_fresh() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], Shape::new(vec![3])).unwrap();
    let c = t.clone();
    assert_ne!(c.id(), t.id());
    assert_eq!(c.ref_count(), 1);
    assert_eq!(c.to_vec().unwrap(), t.to_vec().unwrap());
    t.set_at(&[0], 99.0).unwrap();
    assert_eq!(c.at(&[0]).unwrap(), 1.0);
}

#[test]
fn contiguous_tensor_reports_canonical_strides() {
    let t = Tensor::new(DataType::F32, Shape::new(vec![4, 5]));
    assert!(t.is_contiguous());
    assert_eq!(t.strides(), t.shape().canonical_strides());
}

#[test]
fn view_acquire_release_accounting() {
    let t = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2])).unwrap();
    assert_eq!(t.ref_count(), 1);
    let v1 = t.view();
    let v2 = v1.view();
    assert_eq!(t.ref_count(), 3);
    assert_eq!(v2.id(), t.id());
    drop(v1);
    assert_eq!(t.ref_count(), 2);
    drop(v2);
    assert_eq!(t.ref_count(), 1);
}

#[test]
fn reshape_round_trip_preserves_data_and_shape() {
    let t = Tensor::from_vec((0..12).map(|v| v as f32).collect(), Shape::new(vec![3, 4])).unwrap();
    let r = t.reshape(Shape::new(vec![2, 6])).unwrap();
    let back = r.reshape(t.shape().clone()).unwrap();
    assert!(back.shape().same_as(t.shape()));
    assert_eq!(back.to_vec().unwrap(), t.to_vec().unwrap());
}

#[test]
fn rank0_behaves_as_scalar() {
    let t = Tensor::scalar(3.5);
    assert_eq!(t.rank(), 0);
    assert_eq!(t.numel(), 1);
    assert_eq!(t.at(&[]).unwrap(), 3.5);
    let doubled = t.scale(2.0, None).unwrap();
    assert_eq!(doubled.at(&[]).unwrap(), 7.0);
    assert_eq!(t.sum_all().unwrap(), 3.5);
}

#[test]
fn subtensor_view_writes_are_visible_in_origin() {
    let t = Tensor::from_vec(vec![0.0; 6], Shape::new(vec![2, 3])).unwrap();
    let row = t.subtensor(1).unwrap();
    row.fill(5.0).unwrap();
    assert_eq!(t.to_vec().unwrap(), vec![0.0, 0.0, 0.0, 5.0, 5.0, 5.0]);
}

#[test]
fn from_diagonal_places_entries() {
    let t = Tensor::from_diagonal(&[1.0, 2.0, 3.0]);
    assert_eq!(t.shape().dims(), &[3, 3]);
    assert_eq!(t.at(&[1, 1]).unwrap(), 2.0);
    assert_eq!(t.at(&[0, 1]).unwrap(), 0.0);
    assert_eq!(t.sum_all().unwrap(), 6.0);
}

#[test]
fn element_iteration_with_fixed_axes() {
    let t = Tensor::from_vec((0..6).map(|v| v as f32).collect(), Shape::new(vec![2, 3])).unwrap();
    // Read only row 1.
    let mut row1 = Vec::new();
    t.for_each_element(&[(0, 1)], |_, v| row1.push(v)).unwrap();
    assert_eq!(row1, vec![3.0, 4.0, 5.0]);
    // Rewrite column 0 in place.
    t.for_each_element_mut(&[(1, 0)], |_, v| *v = -1.0).unwrap();
    assert_eq!(t.to_vec().unwrap(), vec![-1.0, 1.0, 2.0, -1.0, 4.0, 5.0]);
}

#[test]
fn empty_tensor_is_nil() {
    let t = Tensor::empty(DataType::F32);
    assert!(t.is_empty());
    assert!(!Tensor::scalar(0.0).is_empty());
}
