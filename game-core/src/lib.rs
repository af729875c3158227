pub mod hints;
pub mod rooms;
pub mod scoring;
pub mod sweep;
pub mod text;
pub mod validate;
pub mod words;

// Re-export main components
pub use hints::*;
pub use rooms::*;
pub use scoring::*;
pub use sweep::*;
pub use text::*;
pub use validate::*;
pub use words::*;
