//! Inversion: turning an assignment on a call's result into assignments on its sources.
//!
//! An [`Inverter`] receives the call (with every source marked), the result as it currently
//! is, and the requested [`Assignment`]. It answers with [`Inversal`]s such that re-running the
//! call with each source changed accordingly reproduces the assignment. Inverters are chosen
//! by [`FunctionCategory`]; categories without one report [`QuibError::NoInverter`], which the
//! quib graph treats as "override locally".

pub mod elementwise;
pub mod inverse_functions;
pub mod transpositional;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    assignment::{Assignment, AssignmentValue},
    func::FunctionCategory,
    translation::{SourceFuncCall, SourceId},
    value::Value,
    QuibError,
};

pub use elementwise::ElementwiseInverter;
pub use transpositional::TranspositionalInverter;

/// Solves `f(args) = target` for one operand.
pub type InverseFn = fn(target: f64, args: &[f64]) -> f64;

/// Registered inverse of an elementwise function for one of its positional arguments.
#[derive(Clone, Copy)]
pub struct ElementwiseInverse {
    pub argument: usize,
    pub func: InverseFn,
}

impl fmt::Debug for ElementwiseInverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementwiseInverse(arg {})", self.argument)
    }
}

/// A source and the assignment it must receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inversal {
    pub source: SourceId,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InversionOptions {
    /// Reject elementwise inversion when operands share an ancestor.
    pub assignment_restrictions: bool,
}

impl Default for InversionOptions {
    fn default() -> Self {
        InversionOptions {
            assignment_restrictions: true,
        }
    }
}

pub trait Inverter {
    fn get_inversals(&self) -> Result<Vec<Inversal>, QuibError>;
}

/// Invert `assignment` on the result of `func_call`. `previous_result` is the result the
/// assignment is made against.
pub fn invert(
    func_call: &SourceFuncCall,
    assignment: &Assignment,
    previous_result: &Value,
    options: InversionOptions,
) -> Result<Vec<Inversal>, QuibError> {
    if matches!(assignment.value, AssignmentValue::Default | AssignmentValue::Delta(_)) {
        return Err(QuibError::NoInverter(format!(
            "{}: only value assignments propagate upstream",
            func_call.func.name
        )));
    }
    match func_call.func.category {
        FunctionCategory::Elementwise => ElementwiseInverter {
            func_call,
            assignment,
            previous_result,
            options,
        }
        .get_inversals(),
        FunctionCategory::Transpositional => TranspositionalInverter {
            func_call,
            assignment,
            previous_result,
        }
        .get_inversals(),
        _ => Err(QuibError::NoInverter(func_call.func.name.clone())),
    }
}
