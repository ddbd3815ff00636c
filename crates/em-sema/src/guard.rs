use std::mem;
use std::ops::{Deref, DerefMut};

use em_core::types::Substitution;
use em_core::{bail, Location, Result};

use crate::context::{CompilationContext, FunctionState};

/// Swaps in a substitution, namespace and empty emission cursor for the
/// lifetime of the guard and restores the previous ones on drop, on every
/// exit path including errors.
pub(crate) struct StateGuard<'a> {
    ctx: &'a mut CompilationContext,
    saved_subst: Substitution,
    saved_namespace: Vec<String>,
    saved_func: Option<FunctionState>,
    counts_depth: bool,
}

impl<'a> StateGuard<'a> {
    /// Enters a template instantiation, enforcing the depth limit.
    pub fn instantiation(
        ctx: &'a mut CompilationContext,
        subst: Substitution,
        namespace: Vec<String>,
        location: Location,
    ) -> Result<Self> {
        if ctx.instantiation_depth >= ctx.options.max_instantiation_depth {
            bail!(
                at location,
                "template instantiation depth exceeds {}",
                ctx.options.max_instantiation_depth
            );
        }
        ctx.instantiation_depth += 1;
        Ok(Self::enter(ctx, subst, namespace, true))
    }

    /// Switches to another declaration's environment: a function body
    /// being emitted or a base aggregate checked on demand.
    pub fn scoped(
        ctx: &'a mut CompilationContext,
        subst: Substitution,
        namespace: Vec<String>,
    ) -> Self {
        Self::enter(ctx, subst, namespace, false)
    }

    fn enter(
        ctx: &'a mut CompilationContext,
        subst: Substitution,
        namespace: Vec<String>,
        counts_depth: bool,
    ) -> Self {
        let saved_subst = mem::replace(&mut ctx.subst, subst);
        let saved_namespace = mem::replace(&mut ctx.namespace, namespace);
        let saved_func = ctx.func.take();
        Self {
            ctx,
            saved_subst,
            saved_namespace,
            saved_func,
            counts_depth,
        }
    }
}

impl Deref for StateGuard<'_> {
    type Target = CompilationContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.ctx.subst = mem::take(&mut self.saved_subst);
        self.ctx.namespace = mem::take(&mut self.saved_namespace);
        self.ctx.func = self.saved_func.take();
        if self.counts_depth {
            self.ctx.instantiation_depth -= 1;
        }
    }
}
