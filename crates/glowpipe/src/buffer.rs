/// Floats reserved before the first frame so early frames do not reallocate.
pub const INITIAL_BUFFER_FLOATS: usize = 50_000;

/// Reusable CPU-side vertex storage backing one GPU vertex buffer.
///
/// Capacity only ever grows, to the largest frame seen so far times a
/// safety factor. The cursor is rewound on every [`VertexBuffer::reset`].
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    data: Vec<f32>,
    cursor: usize,
    generation: u64,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_FLOATS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            cursor: 0,
            generation: 0,
        }
    }

    /// Ensures room for `required` floats and rewinds the write cursor.
    pub fn reset(&mut self, required: usize) {
        if required > self.data.len() {
            let grown = ((required as f64) * 1.5).ceil() as usize;
            let capacity = grown.max(self.data.len() * 2);
            tracing::debug!(
                from = self.data.len(),
                to = capacity,
                required,
                "growing vertex buffer"
            );
            self.data = vec![0.0; capacity];
            self.generation += 1;
        }
        self.cursor = 0;
    }

    /// Appends one fixed-size run of values at the cursor.
    ///
    /// Callers size the buffer through [`VertexBuffer::reset`] first; the
    /// cursor never moves past the allocated capacity.
    pub fn push(&mut self, values: &[f32]) {
        let end = self.cursor + values.len();
        debug_assert!(
            end <= self.data.len(),
            "vertex buffer overflow: {end} > {}",
            self.data.len()
        );
        self.data[self.cursor..end].copy_from_slice(values);
        self.cursor = end;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Values written since the last reset.
    pub fn written(&self) -> &[f32] {
        &self.data[..self.cursor]
    }

    /// The whole backing store, as uploaded to the GPU.
    pub fn backing_store(&self) -> &[f32] {
        &self.data
    }

    /// Incremented whenever the backing store is reallocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for VertexBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_within_capacity_keeps_storage() {
        let mut buffer = VertexBuffer::with_capacity(100);
        buffer.reset(40);
        buffer.push(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3);
        buffer.reset(100);
        assert_eq!(buffer.capacity(), 100);
        assert_eq!(buffer.generation(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn growth_uses_larger_of_headroom_and_doubling() {
        let mut buffer = VertexBuffer::with_capacity(100);
        buffer.reset(101);
        assert_eq!(buffer.capacity(), 200);

        buffer.reset(1000);
        assert_eq!(buffer.capacity(), 1500);
        assert_eq!(buffer.generation(), 2);
    }

    #[test]
    fn capacity_is_monotonic_and_covers_requests() {
        let mut buffer = VertexBuffer::with_capacity(16);
        let mut last = buffer.capacity();
        for required in [3, 40, 10, 0, 41, 500, 7, 499, 2048, 1] {
            buffer.reset(required);
            assert!(buffer.capacity() >= required);
            assert!(buffer.capacity() >= last);
            assert_eq!(buffer.len(), 0);
            last = buffer.capacity();
        }
    }

    #[test]
    fn written_reflects_pushed_runs() {
        let mut buffer = VertexBuffer::with_capacity(8);
        buffer.reset(6);
        buffer.push(&[1.0, 2.0, 3.0]);
        buffer.push(&[4.0, 5.0, 6.0]);
        assert_eq!(buffer.written(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buffer.backing_store().len(), 8);
    }
}
