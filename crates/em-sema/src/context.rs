use em_core::ast::{Ast, NodeId};
use em_core::diagnostics::{Diagnostic, DiagnosticManager};
use em_core::lir::layout::DataLayout;
use em_core::lir::{BasicBlockId, FunctionBuilder, LirProgram, LirValue};
use em_core::types::{Substitution, Type};
use em_core::{debug, warn, CompileOptions, Error, Location, Result};

use crate::scope::{LoopTargets, Scope};
use crate::state::{NodeState, NodeStates};
use crate::symbols::{SymbolTables, TableLayout};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Check,
    Emit,
}

/// Work deferred until the emit phase: instances created while checking.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pending {
    Function(String),
    Aggregate(String),
}

/// Cursor state of the function under emission. Saved and restored as one
/// unit when emission nests.
#[derive(Debug)]
pub(crate) struct FunctionState {
    pub builder: FunctionBuilder,
    pub key: String,
    pub ret: Type,
    pub ret_slot: Option<LirValue>,
    pub exit: BasicBlockId,
    /// Last block of the exit path; deferred statements are appended here
    /// and the function returns from it.
    pub exit_tail: BasicBlockId,
    pub scope: Scope,
    pub loops: Vec<LoopTargets>,
    /// `void main` returns `int 0`.
    pub implicit_zero: bool,
    /// Constructors return their `this` local.
    pub constructor: bool,
    pub in_defer: bool,
}

/// The result of a compilation unit.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub program: LirProgram,
    pub diagnostics: Vec<Diagnostic>,
}

/// All state of one compilation unit. Every phase entry point takes it by
/// `&mut`; nothing lives in globals.
pub struct CompilationContext {
    pub(crate) ast: Ast,
    pub(crate) options: CompileOptions,
    pub(crate) layout: DataLayout,
    pub(crate) symbols: SymbolTables,
    pub(crate) states: NodeStates,
    pub(crate) subst: Substitution,
    pub(crate) namespace: Vec<String>,
    pub(crate) func: Option<FunctionState>,
    pub(crate) program: LirProgram,
    pub(crate) diagnostics: DiagnosticManager,
    pub(crate) pending: Vec<Pending>,
    pub(crate) phase: Phase,
    pub(crate) instantiation_depth: usize,
    pub(crate) nesting_depth: usize,
    pub(crate) string_count: usize,
}

impl CompilationContext {
    pub fn new(ast: Ast, options: CompileOptions) -> Self {
        let layout = DataLayout::from_pointer_bits(options.pointer_bits);
        Self {
            ast,
            options,
            layout,
            symbols: SymbolTables::default(),
            states: NodeStates::default(),
            subst: Substitution::new(),
            namespace: Vec::new(),
            func: None,
            program: LirProgram::new(),
            diagnostics: DiagnosticManager::new(),
            pending: Vec::new(),
            phase: Phase::Check,
            instantiation_depth: 0,
            nesting_depth: 0,
            string_count: 0,
        }
    }

    /// Returns the context to its freshly constructed state. The tree and
    /// the options are kept; every table, state and counter is cleared.
    pub fn reset(&mut self) {
        debug!("resetting compilation context");
        self.symbols.clear();
        self.states.clear();
        self.subst = Substitution::new();
        self.namespace.clear();
        self.func = None;
        self.program = LirProgram::new();
        self.diagnostics.clear();
        self.pending.clear();
        self.phase = Phase::Check;
        self.instantiation_depth = 0;
        self.nesting_depth = 0;
        self.string_count = 0;
    }

    /// Registers every declaration reachable from `roots`.
    pub fn check(&mut self, roots: &[NodeId]) -> Result<()> {
        self.phase = Phase::Check;
        crate::check::check_roots(self, roots)
    }

    /// Lowers `roots` and every pending instance to LIR.
    pub fn emit(&mut self, roots: &[NodeId]) -> Result<()> {
        self.phase = Phase::Emit;
        crate::emit::emit_roots(self, roots)
    }

    pub fn into_unit(self) -> CompiledUnit {
        CompiledUnit {
            program: self.program,
            diagnostics: self.diagnostics.get_diagnostics(),
        }
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.ast
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn symbols(&self) -> &SymbolTables {
        &self.symbols
    }

    pub fn program(&self) -> &LirProgram {
        &self.program
    }

    pub fn diagnostics(&self) -> &DiagnosticManager {
        &self.diagnostics
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn node_state(&self, id: NodeId) -> NodeState {
        self.states.get(id)
    }

    pub fn locate(&self, id: NodeId) -> Location {
        self.ast.locate(id)
    }

    pub(crate) fn layouts(&self) -> TableLayout<'_> {
        TableLayout {
            symbols: &self.symbols,
            pointer_bits: self.options.pointer_bits,
        }
    }

    /// Size of a resolved type in bytes.
    pub fn size_of(&self, ty: &Type) -> Option<u64> {
        ty.size_bytes(&self.layouts())
    }

    pub(crate) fn func(&mut self) -> Result<&mut FunctionState> {
        self.func
            .as_mut()
            .ok_or_else(|| Error::Generic("no function is being emitted".into()))
    }

    pub(crate) fn warn(&self, location: Location, message: String, code: &str) {
        if !self.options.warnings_enabled() {
            return;
        }
        warn!("{}: {}", location, message);
        self.diagnostics.add_diagnostic(
            Diagnostic::warning(message)
                .with_location(location)
                .with_code(code),
        );
    }

    pub(crate) fn qualify(&self, name: &str) -> String {
        qualify_in(&self.namespace, name)
    }

    /// Qualified spellings of `name` from the innermost namespace outward.
    pub(crate) fn candidates(&self, name: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(self.namespace.len() + 1);
        for depth in (0..=self.namespace.len()).rev() {
            out.push(qualify_in(&self.namespace[..depth], name));
        }
        out
    }
}

pub(crate) fn qualify_in(namespace: &[String], name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", namespace.join("::"), name)
    }
}
