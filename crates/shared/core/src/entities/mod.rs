mod context;
mod declaration;
mod state_store;

pub use context::Context;
pub use declaration::{Declarations, VariableDecl};
pub use state_store::StateStore;
