use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};

/// Bounds nesting depth. Holds nothing but a counter.
#[derive(Debug)]
pub struct RecursionGuard {
    depth: usize,
    max_depth: usize,
}

impl RecursionGuard {
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Fails without incrementing once the maximum is reached.
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::NestingTooDeep {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        debug_assert!(self.depth > 0, "unbalanced RecursionGuard::exit");
        self.depth = self.depth.saturating_sub(1);
    }

    /// Enters one level for as long as the returned scope lives.
    pub fn scoped(&mut self) -> Result<DepthScope<'_>> {
        self.enter()?;
        Ok(DepthScope { guard: self })
    }
}

/// One entered level; exits on drop, whichever way the caller leaves.
#[derive(Debug)]
pub struct DepthScope<'g> {
    guard: &'g mut RecursionGuard,
}

impl Deref for DepthScope<'_> {
    type Target = RecursionGuard;

    fn deref(&self) -> &RecursionGuard {
        self.guard
    }
}

impl DerefMut for DepthScope<'_> {
    fn deref_mut(&mut self) -> &mut RecursionGuard {
        self.guard
    }
}

impl Drop for DepthScope<'_> {
    fn drop(&mut self) {
        self.guard.exit();
    }
}
