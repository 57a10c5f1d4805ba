//! fir Interpreter Library
//!
//! Executes fir modules in-process so the compiler can evaluate program logic
//! at compile time without emitting machine code.
//!
//! Values use the packed layout shared with the rest of the toolchain, and
//! functions without a body are called natively through the platform C ABI.

mod config;
mod error;
mod ffi;
mod interpreter;
mod memory;
mod ty;
mod value;

pub use config::{InterpConfig, MAX_CALL_DEPTH_VAR, SANITIZE_VAR};
pub use error::{InterpError, interp_error};
pub use ffi::{Chain, PROCESS_SYMBOLS_SUPPORTED, ProcessSymbols, SymbolResolver, SymbolTable};
pub use interpreter::{BinaryEval, InterpState, UnaryEval};
pub use ty::{Layout, Member, PackedLayout, WORD_SIZE};
pub use value::{Origin, Value};

use anyhow::Result;
use fir::Module;
use tracing::info;

/// Execute a specific function by name from `module`.
///
/// Builds a fresh interpreter configured from the environment, initializes
/// the module and runs the function.
///
/// # Arguments
/// * `module` - Module containing the function
/// * `fn_name` - Name of the function to execute
/// * `args` - Argument values
///
/// # Returns
/// * `Ok(Value)` - Function executed successfully, returns the result value
/// * `Err(anyhow::Error)` - Function not found, or execution failed
pub fn run_function(module: &Module, fn_name: &str, args: &[Value]) -> Result<Value> {
    let mut state = InterpState::with_config(module, InterpConfig::from_env()?);
    state.initialize()?;
    let result = state.run_function_by_name(fn_name, args)?;
    info!("Function '{fn_name}' returned: {result}");
    Ok(result)
}
