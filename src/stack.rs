use primitive_types::U256;

use crate::error::{EvmError, EvmResult};

pub const STACK_LIMIT: usize = 1024;

/// Bounded operand stack. The last element of the backing vector is the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    data: Vec<U256>,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    pub fn new() -> Self {
        Self { data: Vec::with_capacity(64) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bottom to top.
    pub fn as_slice(&self) -> &[U256] {
        &self.data
    }

    pub fn top(&self) -> Option<&U256> {
        self.data.last()
    }

    /// Pushes a value, leaving the stack unchanged on overflow.
    pub fn push(&mut self, value: U256) -> EvmResult<()> {
        if self.data.len() >= STACK_LIMIT {
            return Err(EvmError::StackOverflow(STACK_LIMIT));
        }
        self.data.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> EvmResult<U256> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Reads the element `depth` positions below the top (0 is the top).
    pub fn peek(&self, depth: usize) -> EvmResult<U256> {
        if depth < self.data.len() {
            Ok(self.data[self.data.len() - depth - 1])
        } else {
            Err(EvmError::StackUnderflow)
        }
    }

    /// DUPn: pushes a copy of the n-th element from the top (1 is the top).
    pub fn dup(&mut self, n: usize) -> EvmResult<()> {
        let value = self.peek(n.checked_sub(1).ok_or(EvmError::StackUnderflow)?)?;
        self.push(value)
    }

    /// SWAPn: exchanges the top with the element `n` positions below it.
    pub fn swap_top(&mut self, n: usize) -> EvmResult<()> {
        if n == 0 || n >= self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        let top = self.data.len() - 1;
        self.data.swap(top, top - n);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(values: &[u64]) -> Stack {
        let mut stack = Stack::default();
        for v in values {
            stack.push(U256::from(*v)).unwrap();
        }
        stack
    }

    #[test]
    fn overflow_at_limit() {
        let mut stack = Stack::default();
        for i in 0..STACK_LIMIT {
            stack.push(U256::from(i)).unwrap();
        }
        assert_eq!(stack.push(U256::one()), Err(EvmError::StackOverflow(STACK_LIMIT)));
        assert_eq!(stack.len(), STACK_LIMIT);
    }

    #[test]
    fn underflow_on_empty() {
        let mut stack = Stack::default();
        assert_eq!(stack.pop(), Err(EvmError::StackUnderflow));
        assert!(stack.is_empty());
    }

    #[test]
    fn dup1_copies_top() {
        let mut stack = stack_of(&[5, 9]);
        stack.dup(1).unwrap();
        assert_eq!(stack.as_slice(), &[U256::from(5), U256::from(9), U256::from(9)]);
        assert_eq!(stack.dup(4), Err(EvmError::StackUnderflow));
    }

    #[test]
    fn swap_leaves_middle_untouched() {
        let mut stack = stack_of(&[5, 9]);
        stack.swap_top(1).unwrap();
        assert_eq!(stack.as_slice(), &[U256::from(9), U256::from(5)]);

        let mut stack = stack_of(&[1, 2, 3, 4]);
        stack.swap_top(3).unwrap();
        assert_eq!(stack.as_slice(), &[U256::from(4), U256::from(2), U256::from(3), U256::from(1)]);
        assert_eq!(stack.swap_top(4), Err(EvmError::StackUnderflow));
    }
}
