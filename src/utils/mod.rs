pub mod bloom;
pub mod casefold;
pub mod encoding;

pub use bloom::*;
pub use casefold::*;
pub use encoding::*;
