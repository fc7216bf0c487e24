pub mod account;
pub mod failure;
pub mod market;
pub mod quote;
pub mod settlement;
pub mod settlement_transitions;
pub mod side;
pub mod status;

pub use account::*;
pub use failure::*;
pub use market::*;
pub use quote::*;
pub use settlement::*;
pub use settlement_transitions::*;
pub use side::*;
pub use status::*;
