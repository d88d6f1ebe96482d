//! Tape recording of traced operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::tensor::Tensor;

/// Unique identity of one recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceHandle(u64);

impl TraceHandle {
    /// Generate a new unique handle.
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TraceHandle(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for TraceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Input edge of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predecessor {
    /// Result of an earlier recorded operation.
    Operation(TraceHandle),
    /// Learnable parameter (gradient accumulation point). Not an operation.
    Parameter,
}

impl Predecessor {
    /// Handle of the producing operation, if this edge comes from one.
    #[must_use]
    pub fn operation(self) -> Option<TraceHandle> {
        match self {
            Predecessor::Operation(handle) => Some(handle),
            Predecessor::Parameter => None,
        }
    }

    /// Whether this edge is a parameter accumulation point.
    #[must_use]
    pub fn is_parameter(self) -> bool {
        matches!(self, Predecessor::Parameter)
    }
}

/// One entry in the tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    handle: TraceHandle,
    name: &'static str,
    predecessors: Vec<Predecessor>,
}

impl TraceRecord {
    /// Handle identifying this record.
    #[must_use]
    pub fn handle(&self) -> TraceHandle {
        self.handle
    }

    /// Human-readable operation name (e.g. `ReluBackward`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Predecessors in input order.
    #[must_use]
    pub fn predecessors(&self) -> &[Predecessor] {
        &self.predecessors
    }
}

/// Ordered record of the operations executed by one forward pass.
#[derive(Debug, Clone, Default)]
pub struct Tape {
    records: Vec<TraceRecord>,
    index: HashMap<TraceHandle, usize>,
}

impl Tape {
    /// Create an empty tape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its handle.
    pub fn record(&mut self, name: &'static str, predecessors: Vec<Predecessor>) -> TraceHandle {
        let handle = TraceHandle::next();
        self.index.insert(handle, self.records.len());
        self.records.push(TraceRecord {
            handle,
            name,
            predecessors,
        });
        handle
    }

    /// Record an operation over `inputs` that also consumes `parameters`
    /// learnable tensors.
    ///
    /// Inputs without history contribute nothing. If no predecessor remains
    /// the operation is not recorded and `None` is returned, so the result of
    /// a parameter-free op on constants stays history-free.
    pub fn record_op(
        &mut self,
        name: &'static str,
        inputs: &[&Tensor],
        parameters: usize,
    ) -> Option<TraceHandle> {
        let mut predecessors: Vec<Predecessor> = inputs
            .iter()
            .filter_map(|t| t.history().map(Predecessor::Operation))
            .collect();
        predecessors.extend(std::iter::repeat(Predecessor::Parameter).take(parameters));

        if predecessors.is_empty() {
            return None;
        }
        Some(self.record(name, predecessors))
    }

    /// Look up a record by handle.
    #[must_use]
    pub fn get(&self, handle: TraceHandle) -> Option<&TraceRecord> {
        self.index.get(&handle).map(|&i| &self.records[i])
    }

    /// Execution position of a record (0 = first executed).
    #[must_use]
    pub fn position(&self, handle: TraceHandle) -> Option<usize> {
        self.index.get(&handle).copied()
    }

    /// Records in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of one traced forward evaluation.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    /// Final output of the model.
    pub output: Tensor,
    /// Operations executed to produce it.
    pub tape: Tape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tape_new_is_empty() {
        let tape = Tape::new();
        assert!(tape.is_empty());
        assert_eq!(tape.len(), 0);
    }

    #[test]
    fn test_record_assigns_distinct_handles() {
        let mut tape = Tape::new();
        let a = tape.record("A", vec![Predecessor::Parameter]);
        let b = tape.record("B", vec![Predecessor::Operation(a)]);

        assert_ne!(a, b);
        assert_eq!(tape.position(a), Some(0));
        assert_eq!(tape.position(b), Some(1));
        assert_eq!(tape.get(b).map(TraceRecord::name), Some("B"));
    }

    #[test]
    fn test_record_op_without_history_is_not_recorded() {
        let mut tape = Tape::new();
        let x = Tensor::ones(&[2, 2]);

        assert!(tape.record_op("ReluBackward", &[&x], 0).is_none());
        assert!(tape.is_empty());
    }

    #[test]
    fn test_record_op_keeps_input_order() {
        let mut tape = Tape::new();
        let first = tape.record("First", vec![Predecessor::Parameter]);
        let second = tape.record("Second", vec![Predecessor::Parameter]);

        let a = Tensor::ones(&[1]).with_history(Some(first));
        let b = Tensor::ones(&[1]).with_history(Some(second));
        let raw = Tensor::ones(&[1]);

        let h = tape
            .record_op("AddBackward", &[&a, &raw, &b], 1)
            .expect("inputs carry history");
        let preds = tape.get(h).expect("recorded").predecessors();

        assert_eq!(
            preds,
            &[
                Predecessor::Operation(first),
                Predecessor::Operation(second),
                Predecessor::Parameter
            ]
        );
    }

    #[test]
    fn test_predecessor_helpers() {
        let mut tape = Tape::new();
        let h = tape.record("Op", vec![]);

        assert_eq!(Predecessor::Operation(h).operation(), Some(h));
        assert!(Predecessor::Parameter.operation().is_none());
        assert!(Predecessor::Parameter.is_parameter());
    }

    #[test]
    fn test_unknown_handle_lookup() {
        let mut other = Tape::new();
        let foreign = other.record("Foreign", vec![]);

        let tape = Tape::new();
        assert!(tape.get(foreign).is_none());
        assert!(tape.position(foreign).is_none());
    }

    #[test]
    fn test_handle_display() {
        let mut tape = Tape::new();
        let h = tape.record("Op", vec![]);
        assert!(h.to_string().starts_with("op#"));
    }
}
