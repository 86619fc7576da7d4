//! Culture settings used when values are rendered to or parsed from text.
//!
//! A writer or reader swaps its configured [`Culture`] in for the duration of
//! each call that processes records and restores the previous one afterwards,
//! even when the call fails. The active culture is thread-local, so unrelated
//! work on other threads is never affected.
//!
//! ```
//! use recfmt::culture::{self, Culture};
//!
//! let german = Culture {
//!     name: "de-DE".to_string(),
//!     decimal_separator: ',',
//!     ..Culture::default()
//! };
//!
//! {
//!     let _scope = culture::enter(german);
//!     assert_eq!(culture::current().decimal_separator, ',');
//! }
//! assert_eq!(culture::current().decimal_separator, '.');
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

/// Formatting conventions for number and boolean text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Culture {
    /// Culture name, informational only (e.g. `"en-US"`)
    pub name: String,
    /// Character separating the integral and fractional parts of a number
    pub decimal_separator: char,
    /// Text written for `true`
    pub true_text: String,
    /// Text written for `false`
    pub false_text: String,
}

impl Default for Culture {
    fn default() -> Self {
        Culture {
            name: String::new(),
            decimal_separator: '.',
            true_text: "true".to_string(),
            false_text: "false".to_string(),
        }
    }
}

impl Culture {
    /// Invariant culture: `.` as decimal separator, `true`/`false` booleans.
    #[must_use]
    pub fn invariant() -> Self {
        Self::default()
    }

    /// Render a float with this culture's decimal separator.
    #[must_use]
    pub fn format_float(&self, value: f64) -> String {
        let text = value.to_string();
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    /// Parse a float written with this culture's decimal separator.
    #[must_use]
    pub fn parse_float(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        if self.decimal_separator == '.' {
            text.parse().ok()
        } else {
            text.replace(self.decimal_separator, ".").parse().ok()
        }
    }

    /// Parse a boolean using this culture's texts (case-insensitive).
    #[must_use]
    pub fn parse_bool(&self, text: &str) -> Option<bool> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(&self.true_text) {
            Some(true)
        } else if text.eq_ignore_ascii_case(&self.false_text) {
            Some(false)
        } else {
            None
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Culture> = RefCell::new(Culture::default());
}

/// Returns a copy of the culture active on this thread.
#[must_use]
pub fn current() -> Culture {
    CURRENT.with(|c| c.borrow().clone())
}

/// Run `f` with a reference to the active culture.
pub fn with_current<T>(f: impl FnOnce(&Culture) -> T) -> T {
    CURRENT.with(|c| f(&c.borrow()))
}

/// Make `culture` the active culture until the returned guard is dropped.
#[must_use = "the previous culture is restored as soon as the scope is dropped"]
pub fn enter(culture: Culture) -> CultureScope {
    let previous = CURRENT.with(|c| c.replace(culture));
    CultureScope {
        previous: Some(previous),
    }
}

/// Guard restoring the previous culture on drop.
#[derive(Debug)]
pub struct CultureScope {
    previous: Option<Culture>,
}

impl Drop for CultureScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT.with(|c| {
                c.replace(previous);
            });
        }
    }
}
