pub mod alert;
pub mod dose;
pub mod enums;
pub mod scope;
pub mod sensor;

pub use alert::*;
pub use dose::*;
pub use scope::*;
pub use sensor::*;
