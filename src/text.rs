//! ANSI-aware display width measurement and truncation.
//!
//! Well-formed escape sequences pass through untouched and never count
//! toward width. Malformed ones (a bare ESC, a CSI cut short, an
//! unterminated OSC) measure as nothing and are dropped on truncation.
//! Width is accumulated per code point with `unicode-width`, so CJK and
//! other double-width characters take two cells and combining marks none.

use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

/// Select Graphic Rendition reset, appended wherever a line is cut.
pub const SGR_RESET: &str = "\x1b[0m";

/// Strip ANSI escape sequences from a string.
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.as_bytes().contains(&0x1B) {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut result = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1B {
            i = scan_escape(bytes, i).end;
        } else {
            // ESC is single-byte ASCII, so slicing between escapes is char-aligned.
            let start = i;
            while i < bytes.len() && bytes[i] != 0x1B {
                i += 1;
            }
            result.push_str(&s[start..i]);
        }
    }
    Cow::Owned(result)
}

/// Display width of one line, ignoring escapes and the line-control
/// characters `\r`, `\n` and `\t`.
pub fn display_width(s: &str) -> usize {
    strip_ansi(s)
        .chars()
        .filter(|ch| !is_line_control(*ch))
        .map(char_width)
        .sum()
}

/// Cut `line` so that its display width does not exceed `max_width`.
///
/// Carriage returns, newlines and tabs are removed first: the result is
/// always a single logical line. Malformed escapes are dropped as well, so
/// nothing left in the line can swallow the reset added at a cut. A line
/// that already fits comes back unchanged apart from that; a line that has
/// to be cut gets [`SGR_RESET`] appended at the cut point so colors do not
/// bleed into whatever the terminal prints next. Running the result through
/// this function again with the same width returns it unchanged.
pub fn truncate_line(line: &str, max_width: usize) -> String {
    if max_width == 0 || line.is_empty() {
        return String::new();
    }

    let line: String = if line.chars().any(is_line_control) {
        line.chars().filter(|ch| !is_line_control(*ch)).collect()
    } else {
        line.to_owned()
    };
    let line = drop_malformed_escapes(&line);

    if display_width(&line) <= max_width {
        return line.into_owned();
    }

    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len() + SGR_RESET.len());
    let mut width = 0usize;
    let mut i = 0usize;
    while i < bytes.len() && width < max_width {
        if bytes[i] == 0x1B {
            let end = scan_escape(bytes, i).end;
            out.push_str(&line[i..end]);
            i = end;
            continue;
        }

        let Some(ch) = line[i..].chars().next() else {
            break;
        };
        let w = char_width(ch);
        if width + w > max_width {
            break;
        }
        out.push(ch);
        width += w;
        i += ch.len_utf8();
    }
    out.push_str(SGR_RESET);
    out
}

/// Truncate to `width` then right-pad with spaces so the visible part
/// covers exactly `width` cells (or fewer when a wide char would straddle
/// the edge).
pub fn fit_to_width(line: &str, width: usize) -> String {
    let mut fitted = truncate_line(line, width);
    let used = display_width(&fitted);
    if used < width {
        fitted.push_str(&" ".repeat(width - used));
    }
    fitted
}

fn is_line_control(ch: char) -> bool {
    matches!(ch, '\r' | '\n' | '\t')
}

fn char_width(ch: char) -> usize {
    ch.width().unwrap_or(0)
}

/// `s` without its malformed escape sequences. Borrowed when there was
/// nothing to drop.
fn drop_malformed_escapes(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let mut cleaned: Option<String> = None;
    let mut kept = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != 0x1B {
            i += 1;
            continue;
        }
        let escape = scan_escape(bytes, i);
        if !escape.complete {
            let out = cleaned.get_or_insert_with(|| String::with_capacity(s.len()));
            out.push_str(&s[kept..i]);
            kept = escape.end;
        }
        i = escape.end;
    }
    match cleaned {
        Some(mut out) => {
            out.push_str(&s[kept..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(s),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Escape {
    /// Index just past the sequence.
    end: usize,
    complete: bool,
}

impl Escape {
    fn complete(end: usize) -> Self {
        Self { end, complete: true }
    }

    fn malformed(end: usize) -> Self {
        Self { end, complete: false }
    }
}

/// Classify the escape sequence starting at `pos` (an ESC byte). A
/// malformed sequence ends where the next token starts, which is always a
/// char boundary.
fn scan_escape(bytes: &[u8], pos: usize) -> Escape {
    let next = pos + 1;
    let Some(&introducer) = bytes.get(next) else {
        return Escape::malformed(bytes.len());
    };

    match introducer {
        b'[' => csi_end(bytes, next + 1),
        b']' | b'P' | b'^' | b'_' => string_terminated_end(bytes, next + 1),
        // nF: intermediates then a final byte, e.g. `ESC ( B`.
        0x20..=0x2F => {
            let mut i = next + 1;
            while i < bytes.len() && (0x20..=0x2F).contains(&bytes[i]) {
                i += 1;
            }
            match bytes.get(i) {
                Some(0x30..=0x7E) => Escape::complete(i + 1),
                _ => Escape::malformed(i),
            }
        }
        0x30..=0x7E => Escape::complete(next + 1),
        // Only the ESC goes; whatever follows is scanned on its own.
        _ => Escape::malformed(next),
    }
}

/// CSI: parameters 0x30-0x3F, intermediates 0x20-0x2F, final 0x40-0x7E.
fn csi_end(bytes: &[u8], pos: usize) -> Escape {
    let mut i = pos;
    while i < bytes.len() {
        let b = bytes[i];
        if (0x40..=0x7E).contains(&b) {
            return Escape::complete(i + 1);
        }
        if !(0x20..=0x3F).contains(&b) {
            return Escape::malformed(i);
        }
        i += 1;
    }
    Escape::malformed(bytes.len())
}

/// OSC/DCS/PM/APC end at BEL or ST (`ESC \`).
fn string_terminated_end(bytes: &[u8], pos: usize) -> Escape {
    let mut i = pos;
    while i < bytes.len() {
        match bytes[i] {
            0x07 => return Escape::complete(i + 1),
            0x1B if bytes.get(i + 1) == Some(&b'\\') => return Escape::complete(i + 2),
            _ => i += 1,
        }
    }
    Escape::malformed(bytes.len())
}
