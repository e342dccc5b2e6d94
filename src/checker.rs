//! Expected-versus-actual output comparison with doctest option flags.

const ELLIPSIS_MARKER: &str = "...";
const BLANKLINE_MARKER: &str = "<BLANKLINE>";

/// Comparison options, named as in Python's doctest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompareFlags {
    /// `...` in the expected text matches any run of characters
    pub ellipsis: bool,
    /// Every run of whitespace compares equal to a single space
    pub normalize_whitespace: bool,
    /// Disables `<BLANKLINE>` as a stand-in for an empty line
    pub dont_accept_blankline: bool,
}

impl CompareFlags {
    /// Builds flags from names such as `ELLIPSIS` or `+NORMALIZE_WHITESPACE`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut flags = Self::default();
        for name in names {
            flags.apply(name.as_ref())?;
        }
        Ok(flags)
    }

    /// Applies `+NAME`, `-NAME` or bare `NAME` (enable).
    pub fn apply(&mut self, toggle: &str) -> Result<(), String> {
        let (enable, name) = match toggle.as_bytes().first() {
            Some(b'+') => (true, &toggle[1..]),
            Some(b'-') => (false, &toggle[1..]),
            _ => (true, toggle),
        };
        let flag = match name {
            "ELLIPSIS" => &mut self.ellipsis,
            "NORMALIZE_WHITESPACE" => &mut self.normalize_whitespace,
            "DONT_ACCEPT_BLANKLINE" => &mut self.dont_accept_blankline,
            // meaningful only for Python values and tracebacks
            "DONT_ACCEPT_TRUE_FOR_1" | "IGNORE_EXCEPTION_DETAIL" => return Ok(()),
            _ => return Err(format!("unknown comparison flag '{}'", name)),
        };
        *flag = enable;
        Ok(())
    }
}

/// Whether `got` satisfies `want` under `flags`.
///
/// Trailing newlines are ignored on both sides.
pub fn check_output(want: &str, got: &str, flags: CompareFlags) -> bool {
    let want = want.trim_end_matches('\n');
    let got = got.trim_end_matches('\n');
    if want == got {
        return true;
    }

    let (want, got) = if flags.dont_accept_blankline {
        (want.to_string(), got.to_string())
    } else {
        let want = map_lines(want, |line| {
            if line.trim_end() == BLANKLINE_MARKER {
                ""
            } else {
                line
            }
        });
        let got = map_lines(got, |line| if line.trim().is_empty() { "" } else { line });
        if want == got {
            return true;
        }
        (want, got)
    };

    let (want, got) = if flags.normalize_whitespace {
        let want = want.split_whitespace().collect::<Vec<_>>().join(" ");
        let got = got.split_whitespace().collect::<Vec<_>>().join(" ");
        if want == got {
            return true;
        }
        (want, got)
    } else {
        (want, got)
    };

    flags.ellipsis && ellipsis_match(&want, &got)
}

fn map_lines<'a>(text: &'a str, f: impl Fn(&'a str) -> &'a str) -> String {
    text.lines().map(f).collect::<Vec<_>>().join("\n")
}

/// `...` in `want` matches any substring of `got`, including an empty one.
fn ellipsis_match(want: &str, got: &str) -> bool {
    if !want.contains(ELLIPSIS_MARKER) {
        return want == got;
    }

    let mut pieces = want.split(ELLIPSIS_MARKER);
    let first = pieces.next().unwrap_or_default();
    let mut middle: Vec<&str> = pieces.collect();
    let last = middle.pop().unwrap_or_default();

    if !got.starts_with(first) || !got.ends_with(last) {
        return false;
    }
    let mut start = first.len();
    let end = got.len() - last.len();
    if start > end {
        return false;
    }

    for piece in middle {
        match got[start..end].find(piece) {
            Some(offset) => start += offset + piece.len(),
            None => return false,
        }
    }
    true
}
