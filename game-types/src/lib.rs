pub mod errors;
pub mod ids;
pub mod messages;
pub mod room;

// Re-export all types
pub use errors::*;
pub use ids::*;
pub use messages::*;
pub use room::*;
