pub mod device;
pub mod encoder;
pub mod error;
pub mod interpolate;
pub mod recipe;

pub use device::*;
pub use encoder::*;
pub use error::*;
pub use interpolate::*;
pub use recipe::*;
