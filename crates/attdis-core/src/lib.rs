//! # attdis-core
//!
//! Core abstractions for the attdis disassembler. This crate defines the
//! syntax-neutral instruction model (registers, operands, instructions and
//! control flow) together with the AT&T text rendering of those values.

pub mod instruction;
pub mod operand;
pub mod register;

pub use instruction::{Condition, ControlFlow, Instruction};
pub use operand::{Immediate, MemoryRef, Operand};
pub use register::{Register, RegisterClass};
