pub mod assembler;
pub mod constants;
pub mod machine;
pub mod program;
pub mod runtime;
pub mod terminal;

pub use self::{assembler::assemble, machine::Machine};
