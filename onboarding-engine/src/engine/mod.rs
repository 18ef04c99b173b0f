// Wizard engine
// Pure evaluation (visibility, validation) plus the owned step state machine.

pub mod condition;
pub mod schema;
pub mod steps;
pub mod store;
