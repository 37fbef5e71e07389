//! Two-slot ring for ping-pong buffering.

/// Two buffers alternating as a stage's input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRing<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> BufferRing<T> {
    /// Ring with `input` current and `scratch` as the other slot.
    pub const fn new(input: T, scratch: T) -> Self {
        Self {
            slots: [input, scratch],
            current: 0,
        }
    }

    /// Buffer holding the latest result.
    pub const fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// Buffer the next stage writes into.
    pub const fn other(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// Make the last written buffer current.
    pub fn advance(&mut self) {
        self.current = 1 - self.current;
    }

    /// Number of advances modulo two.
    pub const fn parity(&self) -> usize {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_alternates() {
        let mut ring = BufferRing::new("a", "b");
        assert_eq!((*ring.current(), *ring.other()), ("a", "b"));

        ring.advance();
        assert_eq!((*ring.current(), *ring.other()), ("b", "a"));

        ring.advance();
        assert_eq!(*ring.current(), "a");
        assert_eq!(ring.parity(), 0);
    }
}
