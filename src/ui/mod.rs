//! Interactive terminal pieces: the paged selector and login prompts.

pub mod prompt;
pub mod selector;

pub use prompt::TerminalPrompts;
