pub mod script;
pub mod snippet;

pub use script::GeneratedScript;
pub use snippet::Snippet;
