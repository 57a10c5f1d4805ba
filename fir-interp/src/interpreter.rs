//! This module provides the core interpretation logic.
//!
//! An [`InterpState`] owns everything that outlives a single call: the
//! constant cache, global storage, the string pool, the set of compiled
//! functions and the call stack. Several states may coexist as long as each
//! one interprets its own module.

mod aggregate;
mod call;
mod constant;
mod function;
mod place;
mod rvalue;

pub use rvalue::{BinaryEval, UnaryEval};

use crate::config::InterpConfig;
use crate::error::InterpError;
use crate::ffi::{ProcessSymbols, SymbolResolver};
use crate::memory::Memory;
use crate::memory::stack::StackFrame;
use crate::ty::{LayoutCache, PackedLayout};
use crate::value::{Origin, Value};
use anyhow::{Context, Result, bail};
use fir::{ConstId, FuncId, GlobalId, Local, Module, StringId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Declarations routed to a runtime wrapper when one is available.
const WRAPPED_FUNCTIONS: [&str; 4] = ["printf", "sprintf", "snprintf", "fprintf"];

pub struct InterpState<'m> {
    module: &'m Module,
    config: InterpConfig,
    memory: Memory,
    layouts: LayoutCache,
    constants: HashMap<ConstId, Value>,
    /// Address of each registered global's storage.
    globals: HashMap<GlobalId, Value>,
    strings: HashMap<StringId, usize>,
    /// Compiled functions by identity address.
    compiled: HashMap<usize, FuncId>,
    /// Native symbol used instead of the declared name.
    symbol_aliases: HashMap<FuncId, String>,
    resolver: Box<dyn SymbolResolver>,
    initialized: bool,
}

impl<'m> InterpState<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self::with_config(module, InterpConfig::default())
    }

    pub fn with_config(module: &'m Module, config: InterpConfig) -> Self {
        let memory = Memory::new(config.sanitize_memory);
        Self {
            module,
            config,
            memory,
            layouts: LayoutCache::default(),
            constants: HashMap::new(),
            globals: HashMap::new(),
            strings: HashMap::new(),
            compiled: HashMap::new(),
            symbol_aliases: HashMap::new(),
            resolver: Box::new(ProcessSymbols),
            initialized: false,
        }
    }

    /// Replaces the resolver used to find native symbols.
    pub fn with_resolver(mut self, resolver: impl SymbolResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn config(&self) -> &InterpConfig {
        &self.config
    }

    /// Registers globals, the string pool and native symbol aliases, then
    /// runs the module's global initializer. Calling it again does nothing.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let module = self.module;
        for (id, _) in module.strings() {
            self.global_string(id);
        }
        for (id, global) in module.globals() {
            let size = global.ty.size();
            let address = self.memory.statics.alloc(size);
            if let Some(init) = global.init {
                let value = self
                    .const_operand(init)
                    .with_context(|| format!("Failed to initialize global `{}`", global.name))?;
                if value.size() != size {
                    bail!(InterpError::SizeMismatch {
                        expected: size,
                        found: value.size(),
                    });
                }
                self.memory.write_addr(address, value.as_bytes())?;
            }
            let reference = Value::from_address(global.ty.mut_pointer_to(), address);
            self.globals
                .insert(id, reference.with_origin(Origin::Global(id)));
        }
        self.register_symbol_aliases();
        self.initialized = true;
        info!(
            "Initialized module {} ({} globals, {} strings)",
            module.name(),
            self.globals.len(),
            self.strings.len()
        );

        if self.config.run_global_init
            && let Some(init) = module.global_init()
        {
            debug!("Running global initializer {}", module.function(init).name());
            self.run_function(init, &[])
                .context("Failed to run global initializers")?;
        }
        Ok(())
    }

    fn register_symbol_aliases(&mut self) {
        let module = self.module;
        for (name, func) in module.intrinsics() {
            if !module.function(*func).is_declaration() {
                continue;
            }
            let symbol = format!("__interp_intrinsic_{name}");
            if self.resolver.resolve(&symbol).is_none() {
                warn!("Intrinsic `{name}` has no native implementation `{symbol}`");
            }
            self.symbol_aliases.insert(*func, symbol);
        }
        for (id, func) in module.functions() {
            if func.is_declaration() && WRAPPED_FUNCTIONS.contains(&func.name()) {
                let wrapper = format!("__interp_wrapper_{}", func.name());
                if self.resolver.resolve(&wrapper).is_some() {
                    debug!("Routing {} through {wrapper}", func.name());
                    self.symbol_aliases.insert(id, wrapper);
                }
            }
        }
    }

    /// Runs `func` with the given arguments and returns its result. Void
    /// functions return a zero-sized value.
    ///
    /// The argument count must match the parameter count exactly, or be at
    /// least the fixed parameter count for variadic declarations.
    pub fn run_function(&mut self, func: FuncId, args: &[Value]) -> Result<Value> {
        let name = self.module.function(func).name();
        info!("Starting interpretation of {name}");
        let result = self
            .call_function(func, args.to_vec())
            .with_context(|| format!("Failed to run `{name}`"))?;
        info!("Function {name} returned: {result}");
        Ok(result)
    }

    pub fn run_function_by_name(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let func = self
            .module
            .function_by_name(name)
            .ok_or_else(|| anyhow::anyhow!("Function '{name}' not found"))?;
        self.run_function(func, args)
    }

    /// Number of active stack frames.
    pub fn frame_count(&self) -> usize {
        self.memory.stack.depth()
    }

    /// Current contents of a registered global.
    pub fn global_value(&self, global: GlobalId) -> Result<Value> {
        let address = self.global_address(global)?;
        let ty = &self.module.global(global).ty;
        Ok(self
            .memory
            .read_value(address, ty)?
            .with_origin(Origin::Global(global)))
    }

    pub fn global_address(&self, global: GlobalId) -> Result<usize> {
        match self.globals.get(&global) {
            Some(reference) => reference.as_address(),
            None => bail!(InterpError::UnresolvedGlobal(
                self.module.global(global).name.clone()
            )),
        }
    }

    /// Prepares a function for execution and returns its identity, the
    /// address used when the function is referenced as a value.
    pub fn compile_function(&mut self, id: FuncId) -> Result<usize> {
        let func = self.module.function(id);
        let address = std::ptr::from_ref(func) as usize;
        if !self.compiled.contains_key(&address) {
            for block in func.blocks() {
                if !block
                    .instructions
                    .last()
                    .is_some_and(|inst| inst.op.is_terminator())
                {
                    bail!(InterpError::InvalidOperand(format!(
                        "block `{}` of `{}` does not end with a terminator",
                        block.name,
                        func.name()
                    )));
                }
            }
            debug!("Compiled {} at 0x{address:x}", func.name());
            self.compiled.insert(address, id);
        }
        Ok(address)
    }

    /// The compiled function identified by `address`, if any.
    pub fn function_at(&self, address: usize) -> Option<FuncId> {
        self.compiled.get(&address).copied()
    }

    /// Interns an entry of the module's string pool.
    fn global_string(&mut self, id: StringId) -> usize {
        let module = self.module;
        let statics = &mut self.memory.statics;
        *self
            .strings
            .entry(id)
            .or_insert_with(|| statics.intern_string(module.string(id)))
    }

    /// Runs `body` in a new stack frame for `id` with the arguments bound.
    ///
    /// The frame is popped whether or not `body` succeeds.
    fn with_stack_frame<R>(
        &mut self,
        id: FuncId,
        args: Vec<Value>,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let depth = self.memory.stack.depth();
        if depth >= self.config.max_call_depth {
            bail!(InterpError::StackOverflow {
                depth: depth + 1,
                limit: self.config.max_call_depth,
            });
        }
        let func = self.module.function(id);
        let mut frame = StackFrame::new(id, func.locals().len());
        for (i, (arg, ty)) in args.into_iter().zip(func.params()).enumerate() {
            let local = Local(i as u32);
            let arg = arg.retype(ty.clone())?.with_origin(Origin::Local(local));
            frame.record_local(local, arg)?;
        }
        self.memory.stack.push(frame);

        let result = body(self);

        let frame = self.memory.stack.pop();
        debug_assert_eq!(frame.map(|f| f.function()), Some(id), "Unexpected stack frame");
        result
    }

    fn frame(&self) -> Result<&StackFrame> {
        self.memory
            .stack
            .current()
            .ok_or_else(|| anyhow::anyhow!("No active stack frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut StackFrame> {
        self.memory
            .stack
            .current_mut()
            .ok_or_else(|| anyhow::anyhow!("No active stack frame"))
    }
}
