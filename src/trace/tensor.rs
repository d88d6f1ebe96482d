//! Dense tensor carrying an optional computation history.

use super::tape::TraceHandle;

/// Dense row-major `f32` tensor.
///
/// # Design
///
/// The tensor stores:
/// - `data`: the numerical values
/// - `shape`: dimensions of the tensor
/// - `history`: handle of the traced operation that produced it, if any
///
/// Raw inputs and constants have no history. Parameters never carry history
/// either; operations that consume them record a parameter leaf instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    history: Option<TraceHandle>,
}

impl Tensor {
    /// Create a new tensor from a slice with the given shape.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the product of shape dimensions.
    #[must_use]
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a tensor taking ownership of `data`.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the product of shape dimensions.
    #[must_use]
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let expected_len: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_len,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_len
        );

        Self {
            data,
            shape: shape.to_vec(),
            history: None,
        }
    }

    /// Create a tensor from a 1D slice (vector).
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self::new(data, &[data.len()])
    }

    /// Create a tensor filled with zeros.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor filled with ones.
    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Create a tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: f32) -> Self {
        let len: usize = shape.iter().product();
        Self::from_vec(vec![value; len], shape)
    }

    /// Attach (or clear) the computation history.
    #[must_use]
    pub fn with_history(mut self, history: Option<TraceHandle>) -> Self {
        self.history = history;
        self
    }

    /// Handle of the operation that produced this tensor.
    #[must_use]
    pub fn history(&self) -> Option<TraceHandle> {
        self.history
    }

    /// Copy of this tensor with no history.
    #[must_use]
    pub fn detach(&self) -> Tensor {
        self.clone().with_history(None)
    }

    /// Get the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get a reference to the underlying data.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Same data viewed with a new shape. History is preserved.
    ///
    /// # Panics
    ///
    /// Panics if `shape` has a different element count.
    #[must_use]
    pub fn reshape(&self, shape: &[usize]) -> Tensor {
        Self::from_vec(self.data.clone(), shape).with_history(self.history)
    }

    /// Keep only the slices at `keep` along `axis`, in the given order.
    ///
    /// The result has no history; this is used to rebuild parameters.
    ///
    /// # Panics
    ///
    /// Panics if `axis` is out of bounds or an index in `keep` is out of
    /// range for that axis.
    #[must_use]
    pub fn select(&self, axis: usize, keep: &[usize]) -> Tensor {
        assert!(
            axis < self.ndim(),
            "axis {axis} out of bounds for {}D tensor",
            self.ndim()
        );
        let dim = self.shape[axis];
        let outer: usize = self.shape[..axis].iter().product();
        let inner: usize = self.shape[axis + 1..].iter().product();

        let mut data = Vec::with_capacity(outer * keep.len() * inner);
        for o in 0..outer {
            for &k in keep {
                assert!(k < dim, "index {k} out of range for axis of size {dim}");
                let start = (o * dim + k) * inner;
                data.extend_from_slice(&self.data[start..start + inner]);
            }
        }

        let mut shape = self.shape.clone();
        shape[axis] = keep.len();
        Self::from_vec(data, &shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.numel(), 6);
        assert!(t.history().is_none());
    }

    #[test]
    #[should_panic(expected = "doesn't match shape")]
    fn test_new_rejects_bad_length() {
        let _ = Tensor::new(&[1.0, 2.0, 3.0], &[2, 2]);
    }

    #[test]
    fn test_select_rows() {
        let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let s = t.select(0, &[0, 2]);
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &[1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_select_columns() {
        let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let s = t.select(1, &[1]);
        assert_eq!(s.shape(), &[2, 1]);
        assert_eq!(s.data(), &[2.0, 5.0]);
    }

    #[test]
    fn test_select_inner_axis_of_4d() {
        // [out=1, in=2, kh=1, kw=2]
        let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 2, 1, 2]);
        let s = t.select(1, &[1]);
        assert_eq!(s.shape(), &[1, 1, 1, 2]);
        assert_eq!(s.data(), &[3.0, 4.0]);
    }

    #[test]
    fn test_reshape_keeps_history() {
        let mut tape = crate::trace::Tape::new();
        let h = tape.record("Op", vec![]);
        let t = Tensor::ones(&[2, 3]).with_history(Some(h));

        let r = t.reshape(&[6]);
        assert_eq!(r.shape(), &[6]);
        assert_eq!(r.history(), Some(h));
        assert!(r.detach().history().is_none());
    }
}
