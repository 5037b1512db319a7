//! Terminal prompts backing the login flow.

use std::io::{self, Write as _};

use crate::api::Workspace;
use crate::auth::{LoginError, LoginPrompts, ScopeChoice, UserChoice};

use super::selector::{Selection, Selector, SelectorOptions};

/// Real terminal implementation of the login prompt seam. Passwords and
/// tokens are read with echo disabled; pickers run the interactive
/// selector in raw mode.
pub struct TerminalPrompts;

fn read_line(label: &'static str) -> Result<String, LoginError> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(LoginError::MissingInput(label));
    }
    Ok(value)
}

fn read_secret(label: &'static str) -> Result<String, LoginError> {
    let value = rpassword::prompt_password(format!("{}: ", label))?;
    if value.is_empty() {
        return Err(LoginError::MissingInput(label));
    }
    Ok(value)
}

impl LoginPrompts for TerminalPrompts {
    fn app_token(&mut self) -> Result<String, LoginError> {
        read_secret("App token")
    }

    fn credentials(&mut self) -> Result<(String, String), LoginError> {
        let user_id = read_line("User ID")?;
        let password = read_secret("Password")?;
        Ok((user_id, password))
    }

    fn password(&mut self) -> Result<String, LoginError> {
        read_secret("Password")
    }

    fn select_user(&mut self, user_ids: &[String]) -> Result<UserChoice, LoginError> {
        let selector = Selector::new(
            user_ids.to_vec(),
            SelectorOptions::list("Select an account").with_trailing("Add a new user"),
        );
        match selector.run()? {
            Selection::Item(index) => Ok(UserChoice::Existing(index)),
            Selection::Trailing => Ok(UserChoice::AddNew),
            Selection::Cancelled => Err(LoginError::Cancelled),
        }
    }

    fn select_scope(&mut self) -> Result<ScopeChoice, LoginError> {
        let selector = Selector::new(
            vec!["Domain".to_string(), "Workspaces".to_string()],
            SelectorOptions::list("Select a scope"),
        );
        match selector.run()? {
            Selection::Item(0) => Ok(ScopeChoice::Domain),
            Selection::Item(_) => Ok(ScopeChoice::Workspaces),
            Selection::Trailing | Selection::Cancelled => Err(LoginError::Cancelled),
        }
    }

    fn select_workspace(&mut self, workspaces: &[Workspace]) -> Result<usize, LoginError> {
        let names: Vec<String> = workspaces.iter().map(|w| w.name.clone()).collect();
        let selector =
            Selector::new(names, SelectorOptions::workspaces("Select a workspace"));
        match selector.run()? {
            Selection::Item(index) => Ok(index),
            Selection::Trailing | Selection::Cancelled => Err(LoginError::Cancelled),
        }
    }
}
