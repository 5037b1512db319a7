//! Authentication: JWT claim inspection and the login flow.

pub mod claims;
pub mod login;

pub use login::{
    LoginError, LoginFlow, LoginOutcome, LoginPrompts, LoginTarget, ScopeChoice, UserChoice,
};
