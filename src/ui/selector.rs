//! Generic keyboard-driven list selector.
//!
//! A paginated, searchable picker used for cached-user, scope, and
//! workspace selection. The state machine (`Selector::handle_key`) is
//! pure and separately testable; `Selector::run` wraps it in a blocking
//! read loop that owns raw keyboard input for its lifetime.
//!
//! Key bindings: arrow keys or h/j/k/l navigate, `/` searches, Enter
//! selects, q cancels. The workspace variant additionally accepts digits
//! for 1-based direct selection and wraps page navigation around; the
//! other variants clamp at page boundaries. The divergence is
//! longstanding observed behavior and is kept as-is.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::queue;

/// Rows per page for user-style pickers
pub const USER_PAGE_SIZE: usize = 10;

/// Rows per page for the workspace picker
pub const WORKSPACE_PAGE_SIZE: usize = 15;

/// Behavior at page boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMotion {
    /// Stop at the first/last page
    Clamp,
    /// Wrap from the last page back to the first and vice versa
    Wrap,
}

/// Picker configuration
pub struct SelectorOptions {
    pub title: String,
    pub page_size: usize,
    pub page_motion: PageMotion,
    /// Accept digit keys as a 1-based direct index (workspace variant)
    pub numeric_input: bool,
    /// Extra selectable row rendered one past the last item
    /// ("Add new user" in the cached-user picker)
    pub trailing_label: Option<String>,
}

impl SelectorOptions {
    pub fn list(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page_size: USER_PAGE_SIZE,
            page_motion: PageMotion::Clamp,
            numeric_input: false,
            trailing_label: None,
        }
    }

    pub fn with_trailing(mut self, label: impl Into<String>) -> Self {
        self.trailing_label = Some(label.into());
        self
    }

    pub fn workspaces(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page_size: WORKSPACE_PAGE_SIZE,
            page_motion: PageMotion::Wrap,
            numeric_input: true,
            trailing_label: None,
        }
    }
}

/// Outcome of a completed picker interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Index into the original (unfiltered) item list
    Item(usize),
    /// The trailing row was chosen
    Trailing,
    /// The user cancelled with q
    Cancelled,
}

pub struct Selector {
    items: Vec<String>,
    opts: SelectorOptions,
    /// Indices into `items` surviving the current search filter
    filtered: Vec<usize>,
    page: usize,
    /// Cursor within the current page
    cursor: usize,
    search_mode: bool,
    search_term: String,
    /// Pending digits for numeric selection
    input_buffer: String,
}

impl Selector {
    pub fn new(items: Vec<String>, opts: SelectorOptions) -> Self {
        let filtered = (0..items.len()).collect();
        Self {
            items,
            opts,
            filtered,
            page: 0,
            cursor: 0,
            search_mode: false,
            search_term: String::new(),
            input_buffer: String::new(),
        }
    }

    fn total_rows(&self) -> usize {
        self.filtered.len() + usize::from(self.opts.trailing_label.is_some())
    }

    fn total_pages(&self) -> usize {
        self.total_rows().div_ceil(self.opts.page_size).max(1)
    }

    fn rows_on_page(&self) -> usize {
        let start = self.page * self.opts.page_size;
        self.total_rows().saturating_sub(start).min(self.opts.page_size)
    }

    /// Recompute the filtered list from the search term. An empty term or
    /// a term matching nothing yields the full list; the term itself is
    /// kept so the user can keep editing it.
    fn refilter(&mut self) {
        if self.search_term.is_empty() {
            self.filtered = (0..self.items.len()).collect();
            return;
        }
        let term = self.search_term.to_lowercase();
        let matches: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, label)| label.to_lowercase().contains(&term))
            .map(|(i, _)| i)
            .collect();
        self.filtered = if matches.is_empty() {
            (0..self.items.len()).collect()
        } else {
            matches
        };
    }

    fn next_page(&mut self) {
        match self.opts.page_motion {
            PageMotion::Wrap => self.page = (self.page + 1) % self.total_pages(),
            PageMotion::Clamp => {
                if self.page + 1 >= self.total_pages() {
                    return;
                }
                self.page += 1;
            }
        }
        self.cursor = 0;
    }

    fn prev_page(&mut self) {
        match self.opts.page_motion {
            PageMotion::Wrap => {
                let pages = self.total_pages();
                self.page = (self.page + pages - 1) % pages;
            }
            PageMotion::Clamp => {
                if self.page == 0 {
                    return;
                }
                self.page -= 1;
            }
        }
        self.cursor = 0;
    }

    /// Apply one key event. Returns `Some` when the interaction finishes.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Selection> {
        if self.search_mode {
            match key.code {
                KeyCode::Esc => {
                    self.search_mode = false;
                    self.search_term.clear();
                    self.refilter();
                }
                KeyCode::Backspace => {
                    self.search_term.pop();
                    self.refilter();
                }
                KeyCode::Enter => {
                    // Commit the current filter without selecting
                    self.search_mode = false;
                }
                KeyCode::Char(c) => {
                    self.search_term.push(c);
                    self.refilter();
                }
                _ => {}
            }
            self.page = 0;
            self.cursor = 0;
            return None;
        }

        match key.code {
            KeyCode::Enter => {
                if self.opts.numeric_input && !self.input_buffer.is_empty() {
                    let buffer = std::mem::take(&mut self.input_buffer);
                    if let Ok(n) = buffer.parse::<usize>() {
                        if (1..=self.filtered.len()).contains(&n) {
                            return Some(Selection::Item(self.filtered[n - 1]));
                        }
                    }
                    // Out-of-range or unparsable input is discarded silently
                    return None;
                }
                let absolute = self.page * self.opts.page_size + self.cursor;
                if absolute < self.filtered.len() {
                    return Some(Selection::Item(self.filtered[absolute]));
                }
                if absolute == self.filtered.len() && self.opts.trailing_label.is_some() {
                    return Some(Selection::Trailing);
                }
                None
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                }
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < self.rows_on_page() {
                    self.cursor += 1;
                }
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.next_page();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.prev_page();
                None
            }
            KeyCode::Char('/') => {
                self.search_mode = true;
                self.search_term.clear();
                self.refilter();
                self.page = 0;
                self.cursor = 0;
                None
            }
            KeyCode::Char(c @ '0'..='9') if self.opts.numeric_input => {
                self.input_buffer.push(c);
                None
            }
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(Selection::Cancelled),
            _ => None,
        }
    }

    /// Run the blocking read loop until the user selects or cancels.
    /// Raw mode is held for the duration and restored on every exit path,
    /// including errors and panics, by the scope guard.
    pub fn run(mut self) -> io::Result<Selection> {
        let _guard = RawModeGuard::acquire()?;
        let mut stdout = io::stdout();
        loop {
            self.render(&mut stdout)?;
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(selection) = self.handle_key(key) {
                    queue!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
                    stdout.flush()?;
                    return Ok(selection);
                }
            }
        }
    }

    fn render(&self, out: &mut impl Write) -> io::Result<()> {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        write!(
            out,
            "{} (Page {} of {})\r\n\r\n",
            self.opts.title,
            self.page + 1,
            self.total_pages()
        )?;

        let start = self.page * self.opts.page_size;
        for row in 0..self.rows_on_page() {
            let absolute = start + row;
            let label = if absolute < self.filtered.len() {
                self.items[self.filtered[absolute]].as_str()
            } else {
                self.opts.trailing_label.as_deref().unwrap_or("")
            };
            let marker = if row == self.cursor { "→" } else { " " };
            write!(out, "{} {}: {}\r\n", marker, absolute + 1, label)?;
        }

        write!(
            out,
            "\r\nNavigation: [h]prev-page [j]down [k]up [l]next-page [/]search [Enter]select [q]uit\r\n"
        )?;

        if self.search_mode {
            write!(
                out,
                "\r\nSearch (ESC to cancel, Enter to confirm): {}",
                self.search_term
            )?;
        } else if self.opts.numeric_input {
            write!(
                out,
                "\r\nSelect an entry above or type a number: {}",
                self.input_buffer
            )?;
        }

        out.flush()
    }
}

/// Scoped raw-mode acquisition. Dropping the guard restores cooperative
/// (line-buffered) terminal mode on every exit path.
struct RawModeGuard;

impl RawModeGuard {
    fn acquire() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::from(KeyCode::Char(c))
    }

    fn code(code: KeyCode) -> KeyEvent {
        KeyEvent::from(code)
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ws-{:02}", i)).collect()
    }

    fn user_selector(items: Vec<String>) -> Selector {
        Selector::new(
            items,
            SelectorOptions::list("Select a user account").with_trailing("Add new user"),
        )
    }

    fn workspace_selector(items: Vec<String>) -> Selector {
        Selector::new(items, SelectorOptions::workspaces("Accessible Workspaces"))
    }

    #[test]
    fn test_cursor_clamps_within_page() {
        let mut s = workspace_selector(labels(3));
        for _ in 0..5 {
            assert_eq!(s.handle_key(key('j')), None);
        }
        assert_eq!(s.cursor, 2);
        for _ in 0..5 {
            assert_eq!(s.handle_key(key('k')), None);
        }
        assert_eq!(s.cursor, 0);
    }

    #[test]
    fn test_clamp_variant_stops_at_boundaries() {
        // 25 items + trailing row on a 10-row page = 3 pages
        let mut s = user_selector(labels(25));
        for _ in 0..5 {
            s.handle_key(key('l'));
        }
        assert_eq!(s.page, 2);
        for _ in 0..5 {
            s.handle_key(key('h'));
        }
        assert_eq!(s.page, 0);
    }

    #[test]
    fn test_wrap_variant_wraps_around() {
        // 20 items on 15-row pages = 2 pages
        let mut s = workspace_selector(labels(20));
        s.handle_key(key('l'));
        assert_eq!(s.page, 1);
        s.handle_key(key('l'));
        assert_eq!(s.page, 0);
        s.handle_key(key('h'));
        assert_eq!(s.page, 1);
        assert_eq!(s.cursor, 0);
    }

    #[test]
    fn test_enter_resolves_absolute_index() {
        let mut s = workspace_selector(labels(20));
        s.handle_key(key('l'));
        s.handle_key(key('j'));
        s.handle_key(key('j'));
        // page 1, cursor 2 -> absolute 17
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(17)));
    }

    #[test]
    fn test_search_filters_case_insensitive() {
        let mut s = workspace_selector(vec![
            "alpha".into(),
            "Beta".into(),
            "gamma".into(),
            "beta-two".into(),
        ]);
        s.handle_key(key('/'));
        s.handle_key(key('b'));
        s.handle_key(key('e'));
        assert_eq!(s.filtered, vec![1, 3]);

        // Enter commits the filter without selecting
        assert_eq!(s.handle_key(code(KeyCode::Enter)), None);
        assert!(!s.search_mode);
        assert_eq!(s.search_term, "be");

        // Selection maps back to the original index
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(1)));
    }

    #[test]
    fn test_search_no_match_falls_back_to_full_list() {
        let mut s = workspace_selector(labels(4));
        s.handle_key(key('/'));
        for c in "zzz".chars() {
            s.handle_key(key(c));
        }
        assert_eq!(s.filtered.len(), 4);
        assert_eq!(s.search_term, "zzz");
    }

    #[test]
    fn test_escape_exits_search_and_clears_term() {
        let mut s = workspace_selector(labels(4));
        s.handle_key(key('/'));
        s.handle_key(key('w'));
        s.handle_key(code(KeyCode::Esc));
        assert!(!s.search_mode);
        assert!(s.search_term.is_empty());
        assert_eq!(s.filtered.len(), 4);
    }

    #[test]
    fn test_search_entry_resets_page_and_cursor() {
        let mut s = workspace_selector(labels(20));
        s.handle_key(key('l'));
        s.handle_key(key('j'));
        s.handle_key(key('/'));
        assert_eq!(s.page, 0);
        assert_eq!(s.cursor, 0);
        assert!(s.search_mode);
    }

    #[test]
    fn test_trailing_row_one_past_last_item() {
        let mut s = user_selector(labels(2));
        s.handle_key(key('j'));
        s.handle_key(key('j'));
        assert_eq!(s.cursor, 2);
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Trailing));
    }

    #[test]
    fn test_trailing_row_paginates() {
        // Exactly one full page of items pushes the trailing row to page 2
        let mut s = user_selector(labels(10));
        s.handle_key(key('l'));
        assert_eq!(s.page, 1);
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Trailing));
    }

    #[test]
    fn test_item_selection_not_trailing() {
        let mut s = user_selector(labels(2));
        s.handle_key(key('j'));
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(1)));
    }

    #[test]
    fn test_numeric_jump_bypasses_cursor() {
        let mut s = workspace_selector(labels(20));
        s.handle_key(key('j'));
        s.handle_key(key('7'));
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(6)));
    }

    #[test]
    fn test_numeric_out_of_range_discarded() {
        let mut s = workspace_selector(labels(5));
        s.handle_key(key('9'));
        s.handle_key(key('9'));
        assert_eq!(s.handle_key(code(KeyCode::Enter)), None);
        assert!(s.input_buffer.is_empty());

        // Buffer cleared: the next Enter falls back to the cursor
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(0)));
    }

    #[test]
    fn test_numeric_resolves_against_filtered_list() {
        let mut s = workspace_selector(vec![
            "alpha".into(),
            "beta".into(),
            "alpine".into(),
        ]);
        s.handle_key(key('/'));
        s.handle_key(key('a'));
        s.handle_key(key('l'));
        s.handle_key(code(KeyCode::Enter));
        assert_eq!(s.filtered, vec![0, 2]);

        s.handle_key(key('2'));
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(2)));
    }

    #[test]
    fn test_digits_ignored_without_numeric_variant() {
        let mut s = user_selector(labels(5));
        s.handle_key(key('3'));
        assert!(s.input_buffer.is_empty());
        assert_eq!(s.handle_key(code(KeyCode::Enter)), Some(Selection::Item(0)));
    }

    #[test]
    fn test_digits_feed_search_term_in_search_mode() {
        let mut s = workspace_selector(labels(20));
        s.handle_key(key('/'));
        s.handle_key(key('1'));
        assert_eq!(s.search_term, "1");
        assert!(s.input_buffer.is_empty());
    }

    #[test]
    fn test_quit_cancels() {
        let mut s = workspace_selector(labels(3));
        assert_eq!(s.handle_key(key('q')), Some(Selection::Cancelled));

        let mut s = user_selector(labels(3));
        assert_eq!(s.handle_key(key('Q')), Some(Selection::Cancelled));
    }
}
