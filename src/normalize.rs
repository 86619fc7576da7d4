//! Text normalization: quoting, padding, truncation and escaping.
//!
//! [`render`] turns the text of a resolved value into its final output form
//! for one field; [`unrender`] reverses it for the read direction. Both are
//! pure functions of their inputs.

use std::borrow::Cow;

use quick_xml::escape::{partial_escape, unescape};

use crate::error::{RecfmtError, Result};
use crate::field::{FieldDescriptor, Justification};

const CDATA_PREFIX: &str = "<![CDATA[";
const QUOTE: char = '"';

/// Escaping applied after padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escaping {
    /// Text is written as is
    #[default]
    None,
    /// HTML entity encoding, except for CDATA-prefixed text
    Xml,
}

/// Format-level inputs to [`render`].
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Record line delimiter; text containing it must be quoted
    pub line_delimiter: &'a str,
    /// Escaping of the output format
    pub escaping: Escaping,
    /// Rendering a header line instead of a data row
    pub is_header: bool,
}

impl<'a> RenderContext<'a> {
    /// Context for data rows.
    #[must_use]
    pub fn new(line_delimiter: &'a str, escaping: Escaping) -> Self {
        RenderContext {
            line_delimiter,
            escaping,
            is_header: false,
        }
    }

    /// The same context for a header line.
    #[must_use]
    pub fn header(self) -> Self {
        RenderContext {
            is_header: true,
            ..self
        }
    }
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2 && text.starts_with(QUOTE) && text.ends_with(QUOTE)
}

/// Render `text` for `field`.
///
/// # Errors
///
/// Returns [`RecfmtError::Format`] when a header value contains the line
/// delimiter while quoting is disabled, and [`RecfmtError::LengthOverflow`]
/// when the text exceeds the field size and truncation is off.
pub fn render(text: &str, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Result<String> {
    let has_delimiter = !ctx.line_delimiter.is_empty() && text.contains(ctx.line_delimiter);
    let wrap = match field.quote {
        Some(true) => true,
        Some(false) if has_delimiter && ctx.is_header => {
            return Err(RecfmtError::Format(format!(
                "Field header '{text}' contains the line delimiter and quoting is disabled"
            )));
        },
        _ => has_delimiter,
    };

    let mut out = if wrap && !is_quoted(text) {
        format!("{QUOTE}{text}{QUOTE}")
    } else {
        text.to_string()
    };

    if let Some(size) = field.size {
        let len = out.chars().count();
        if len < size {
            let padding: String = std::iter::repeat(field.effective_fill_char())
                .take(size - len)
                .collect();
            match field.effective_justification() {
                Justification::Left => out.push_str(&padding),
                Justification::Right => out.insert_str(0, &padding),
            }
        } else if len > size {
            if field.truncate {
                out = out.chars().take(size).collect();
            } else {
                return Err(RecfmtError::LengthOverflow {
                    field: field.name().to_string(),
                    expected: size,
                    actual: len,
                });
            }
        }
    }

    if ctx.escaping == Escaping::Xml && !out.starts_with(CDATA_PREFIX) {
        out = html_encode(&out);
    }
    Ok(out)
}

/// HTML entity encoding: named entities for `< > & "`, `&#39;` for the
/// apostrophe and decimal references for U+00A0 through U+00FF.
fn html_encode(text: &str) -> String {
    let escaped = partial_escape(text);
    let mut out = String::with_capacity(escaped.len());
    for c in escaped.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("&#{};", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`render`]: unescape, strip padding on the justified side, then
/// strip surrounding quotes.
///
/// Padding is only stripped from fields with a size.
///
/// # Errors
///
/// Returns [`RecfmtError::Format`] when XML entity decoding fails.
pub fn unrender(text: &str, field: &FieldDescriptor, escaping: Escaping) -> Result<String> {
    let decoded: Cow<'_, str> = match escaping {
        Escaping::Xml if !text.starts_with(CDATA_PREFIX) => unescape(text).map_err(|e| {
            RecfmtError::Format(format!("Invalid escaped text in '{}' field: {e}", field.name()))
        })?,
        _ => Cow::Borrowed(text),
    };

    let fill = field.effective_fill_char();
    let unpadded: &str = if field.size.is_some() {
        match field.effective_justification() {
            Justification::Left => decoded.trim_end_matches(fill),
            Justification::Right => decoded.trim_start_matches(fill),
        }
    } else {
        decoded.as_ref()
    };

    let unquoted = if is_quoted(unpadded) {
        &unpadded[1..unpadded.len() - 1]
    } else {
        unpadded
    };
    Ok(unquoted.to_string())
}
