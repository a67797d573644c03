use crate::abi::{INITIAL_FRAME_PTR, MAX_CALL_DEPTH, SAVED_REG_COUNT, STACK_FRAME_SIZE};
use crate::error::Fault;

/// Shadow stack entry. Not addressable from bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub frame_ptr: u64,
    pub saved: [u64; SAVED_REG_COUNT],
    pub return_pc: u64,
}

/// Bounded stack of call frames backing `call` and `exit`.
///
/// Always holds the entry frame, so the depth is between 1 and
/// `MAX_CALL_DEPTH`.
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    #[must_use]
    pub fn new() -> Self {
        let mut frames = Vec::with_capacity(MAX_CALL_DEPTH);
        frames.push(Frame {
            frame_ptr: INITIAL_FRAME_PTR,
            saved: [0; SAVED_REG_COUNT],
            return_pc: 0,
        });
        Self { frames }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frame pointer of the innermost frame.
    #[must_use]
    pub fn frame_ptr(&self) -> u64 {
        self.frames.last().map_or(INITIAL_FRAME_PTR, |f| f.frame_ptr)
    }

    /// Opens a frame two slots above the current one and returns its frame
    /// pointer. The slot in between stays unmapped.
    pub fn push(&mut self, saved: [u64; SAVED_REG_COUNT], return_pc: u64) -> Result<u64, Fault> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(Fault::CallDepthExceeded);
        }
        let frame_ptr = self.frame_ptr() + 2 * STACK_FRAME_SIZE;
        self.frames.push(Frame {
            frame_ptr,
            saved,
            return_pc,
        });
        Ok(frame_ptr)
    }

    /// Closes the innermost frame. Returns `None` when only the entry frame
    /// is left, which means the program is done.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() <= 1 {
            return None;
        }
        self.frames.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_restores() {
        let mut stack = CallStack::new();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.frame_ptr(), INITIAL_FRAME_PTR);

        let fp = stack.push([6, 7, 8, 9], 42).unwrap();
        assert_eq!(fp, INITIAL_FRAME_PTR + 2 * STACK_FRAME_SIZE);
        assert_eq!(stack.frame_ptr(), fp);

        let frame = stack.pop().unwrap();
        assert_eq!(frame.saved, [6, 7, 8, 9]);
        assert_eq!(frame.return_pc, 42);
        assert_eq!(stack.frame_ptr(), INITIAL_FRAME_PTR);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = CallStack::new();
        for i in 1..MAX_CALL_DEPTH {
            stack.push([0; 4], i as u64).unwrap();
        }
        assert_eq!(stack.depth(), MAX_CALL_DEPTH);
        assert_eq!(stack.push([0; 4], 0), Err(Fault::CallDepthExceeded));
        assert_eq!(stack.depth(), MAX_CALL_DEPTH);
    }
}
