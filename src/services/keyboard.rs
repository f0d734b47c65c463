//! Button layout helpers. Pure functions, no I/O.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }

    pub fn back() -> Self {
        Self::new("Back", "back")
    }

    pub fn main_menu() -> Self {
        Self::new("Main menu", "main_menu")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons attached to the message, one inner vec per row.
    Inline(Vec<Vec<Button>>),
    /// One-shot reply keyboard asking the user to share their phone number.
    RequestContact { label: String },
    /// Hide any reply keyboard currently shown.
    Remove,
}

/// Arrange `buttons` into rows of `n_cols`, with optional header and footer
/// rows. A column count of zero is treated as one.
pub fn build_menu(
    buttons: Vec<Button>,
    n_cols: usize,
    header: Option<Vec<Button>>,
    footer: Option<Vec<Button>>,
) -> Vec<Vec<Button>> {
    let mut menu: Vec<Vec<Button>> = buttons
        .chunks(n_cols.max(1))
        .map(|row| row.to_vec())
        .collect();

    if let Some(header) = header.filter(|h| !h.is_empty()) {
        menu.insert(0, header);
    }
    if let Some(footer) = footer.filter(|f| !f.is_empty()) {
        menu.push(footer);
    }
    menu
}
