mod convert;
mod value;

pub use convert::FromValue;
pub use value::{Value, ValueKind};
