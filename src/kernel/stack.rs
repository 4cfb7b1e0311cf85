//! Persistent continuation stack

use std::fmt;
use std::sync::Arc;

use crate::kernel::env::Env;
use crate::kernel::feature::Ident;
use crate::kernel::instr::Instr;

/// One frame of the continuation
#[derive(Clone)]
pub enum StackEntry {
    /// Instruction to execute against an environment
    Instr { instr: Arc<Instr>, env: Env },
    /// Marker left by `try`; catches values thrown by the frames above it
    Catch {
        ident: Ident,
        handler: Arc<Instr>,
        env: Env,
    },
}

struct StackNode {
    entry: StackEntry,
    next: Stack,
}

/// Immutable linked chain of frames. Cloning shares the tail.
#[derive(Clone, Default)]
pub struct Stack(Option<Arc<StackNode>>);

impl Stack {
    pub fn empty() -> Self {
        Stack(None)
    }

    /// Stack holding a single instruction
    pub fn of(instr: Arc<Instr>, env: Env) -> Self {
        Stack::empty().push(StackEntry::Instr { instr, env })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn push(&self, entry: StackEntry) -> Stack {
        Stack(Some(Arc::new(StackNode {
            entry,
            next: self.clone(),
        })))
    }

    /// Top frame and the remaining stack
    pub fn pop(&self) -> Option<(StackEntry, Stack)> {
        self.0
            .as_ref()
            .map(|node| (node.entry.clone(), node.next.clone()))
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.0.as_ref();
        while let Some(node) = current {
            depth += 1;
            current = node.next.0.as_ref();
        }
        depth
    }
}

impl Drop for Stack {
    // Unlink iteratively so long chains do not overflow the thread stack
    fn drop(&mut self) {
        let mut current = self.0.take();
        while let Some(node) = current {
            match Arc::try_unwrap(node) {
                Ok(mut node) => current = node.next.0.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stack(depth={})", self.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_shares_tail() {
        let env = Env::empty();
        let base = Stack::of(Arc::new(Instr::Skip), env.clone());
        let top = base.push(StackEntry::Instr {
            instr: Arc::new(Instr::Skip),
            env,
        });
        assert_eq!(top.depth(), 2);
        let (_, rest) = top.pop().unwrap();
        assert_eq!(rest.depth(), 1);
        assert_eq!(base.depth(), 1);
        assert!(Stack::empty().pop().is_none());
    }

    #[test]
    fn test_deep_stack_drops() {
        let env = Env::empty();
        let instr = Arc::new(Instr::Skip);
        let mut stack = Stack::empty();
        for _ in 0..200_000 {
            stack = stack.push(StackEntry::Instr {
                instr: instr.clone(),
                env: env.clone(),
            });
        }
        drop(stack);
    }
}
