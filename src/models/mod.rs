// src/models/mod.rs
pub mod actor;
pub mod cooperative;
pub mod driver;
pub mod trip;

pub use actor::*;
pub use cooperative::*;
pub use driver::*;
pub use trip::*;
