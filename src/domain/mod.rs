pub mod budget;
pub mod load;
pub mod types;

pub use budget::*;
pub use load::*;
pub use types::*;
