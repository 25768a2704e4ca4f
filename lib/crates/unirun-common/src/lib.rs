pub mod platform;
pub mod quantity;
pub mod types;

pub use platform::{Architecture, Platform, UnknownName};
pub use quantity::{Quantity, QuantityError};
pub use types::*;
