//! Common test utilities and macros

use fir::Module;
use fir_interp::{InterpState, SymbolResolver, Value};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log filter for test runs.
pub const LOG_VAR: &str = "FIR_INTERP_LOG";

#[derive(Debug)]
pub enum TestResult {
    Success,
    SuccessWithValue(Vec<u8>),
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TestResult::Success, TestResult::Success) => true,
            (TestResult::SuccessWithValue(a), TestResult::SuccessWithValue(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ErrorRegex(pattern), TestResult::Error(msg)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            (TestResult::Error(msg), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            _ => false,
        }
    }
}

impl TestResult {
    pub fn from_result(result: anyhow::Result<Value>) -> Self {
        match result {
            Ok(value) if value.size() == 0 => TestResult::Success,
            Ok(value) => TestResult::SuccessWithValue(value.as_bytes().to_vec()),
            Err(e) => TestResult::Error(format!("{e:#}")),
        }
    }
}

/// Installs a log subscriber filtered by [`LOG_VAR`] once per test binary.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn run_program(module: &Module, start_fn: &str, args: &[Value]) -> TestResult {
    init_logging();
    TestResult::from_result(fir_interp::run_function(module, start_fn, args))
}

/// Like [`run_program`], but resolves foreign symbols with `resolver` only.
pub fn run_program_with(
    module: &Module,
    start_fn: &str,
    args: &[Value],
    resolver: impl SymbolResolver + 'static,
) -> TestResult {
    init_logging();
    let mut state = InterpState::new(module).with_resolver(resolver);
    let result = state
        .initialize()
        .and_then(|()| state.run_function_by_name(start_fn, args));
    TestResult::from_result(result)
}

#[macro_export]
macro_rules! check_program {
    ($test_name:ident, program=$program:expr, start_fn=$start_fn:expr, result=$expected:expr) => {
        check_program!(
            $test_name,
            program = $program,
            start_fn = $start_fn,
            args = [],
            result = $expected
        );
    };
    ($test_name:ident, program=$program:expr, start_fn=$start_fn:expr, symbols=$symbols:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let module = $program;
            let result = crate::common::run_program_with(&module, $start_fn, &[], $symbols);
            assert_eq!(result, $expected);
        }
    };
    ($test_name:ident, program=$program:expr, start_fn=$start_fn:expr, args=[$($arg:expr),* $(,)?], result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let module = $program;
            let args: Vec<fir_interp::Value> = vec![$($arg),*];
            let result = crate::common::run_program(&module, $start_fn, &args);
            assert_eq!(result, $expected);
        }
    };
}
