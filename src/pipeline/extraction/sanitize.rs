use std::sync::LazyLock;

use regex::Regex;

/// No-break space and control characters other than `\t \n \r`.
static REMOVABLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{a0}|[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

/// Spaces hugging another kind of whitespace.
static SPACE_AROUND_OTHER_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *([\t\n\r\x0C\x0B]) *").unwrap());

static TRIPLE_LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Two or more whitespace-delimited numeric tokens followed by one more,
/// typically a flattened table row.
static NUMBER_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\(?[-+]?\d*,?\d*[.]?\d+\)?\s+){2,}\(?[-+]?\d*,?\d*[.]?\d+\)?").unwrap()
});

/// Normalize one unit of extracted text.
///
/// Leading whitespace survives since indentation can carry meaning.
/// `clean_text(clean_text(s)) == clean_text(s)`.
pub fn clean_text(raw: &str) -> String {
    let text = REMOVABLE_CHARS.replace_all(raw, " ");
    // Spaces go before repeats collapse: `\t \t` ends as one tab, which
    // keeps a second pass a no-op.
    let text = SPACE_AROUND_OTHER_WS.replace_all(&text, "$1");
    let text = collapse_repeats(&text);
    let text = TRIPLE_LINE_BREAK.replace_all(&text, "\n\n");
    text.trim_end().to_string()
}

/// Replace each run of numeric tokens with a single space.
pub fn remove_number_sequences(text: &str) -> String {
    NUMBER_SEQUENCE.replace_all(text, " ").into_owned()
}

/// Clean each unit, drop the ones that end up empty, join with newlines and
/// clean the joined text once more before removing number runs.
pub fn clean_units<S: AsRef<str>>(units: &[S]) -> String {
    let cleaned: Vec<String> = units
        .iter()
        .map(|u| clean_text(u.as_ref()))
        .filter(|u| !u.is_empty())
        .collect();
    remove_number_sequences(&clean_text(&cleaned.join("\n")))
}

/// Characters whose repetition is meaningful and left alone.
fn keeps_repeats(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('\u{AC00}'..='\u{D7A3}').contains(&c)
        || matches!(c, '_' | '\n' | '-' | '.' | '*' | '\\')
}

fn collapse_repeats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if prev == Some(c) && !keeps_repeats(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_chars_become_spaces() {
        assert_eq!(clean_text("a\u{a0}b\x01c\x7Fd"), "a b c d");
    }

    #[test]
    fn spaces_next_to_newline_removed() {
        assert_eq!(clean_text("first   \n   second"), "first\nsecond");
        assert_eq!(clean_text("a \t b"), "a\tb");
    }

    #[test]
    fn repeated_punctuation_collapsed() {
        assert_eq!(clean_text("wow!!!   ok???"), "wow! ok?");
        assert_eq!(clean_text("======"), "=");
    }

    #[test]
    fn meaningful_repeats_kept() {
        assert_eq!(clean_text("aaa 111 ___ ... *** --- 가가가"), "aaa 111 ___ ... *** --- 가가가");
        assert_eq!(clean_text(r"C:\\path"), r"C:\\path");
    }

    #[test]
    fn space_split_whitespace_collapses_to_one() {
        assert_eq!(clean_text("a\t \tb"), "a\tb");
        assert_eq!(clean_text("a\t\tb"), "a\tb");
        assert_eq!(clean_text("a\r \r b"), "a\rb");
        assert_eq!(clean_text("a\n \n b"), "a\n\nb");
    }

    #[test]
    fn line_breaks_capped_at_two() {
        assert_eq!(clean_text("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn only_trailing_whitespace_stripped() {
        assert_eq!(clean_text("   indented  \n\n"), "   indented");
    }

    #[test]
    fn idempotent_on_awkward_input() {
        let samples = [
            "\t \t x",
            "a \u{a0}\n\u{a0} b",
            "  \r\n\r\n  \r\n\r\n",
            "!! \n\n\n\n !!  \t\t 가나  ",
            "x\x0B\x0B y \x0C\n\n\n\nz",
            "((((1)))) -- ..",
            "",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn number_runs_replaced() {
        assert_eq!(remove_number_sequences("합계 10 20 30 끝"), "합계   끝");
        assert_eq!(
            remove_number_sequences("row (1.5) -2 3,000 end"),
            "row   end"
        );
        // Two numbers are not a run.
        assert_eq!(remove_number_sequences("from 1 to 2"), "from 1 to 2");
    }

    #[test]
    fn units_joined_and_empty_dropped() {
        let units = ["첫 문단  ", "   ", "\x01\x02", "둘째!!!"];
        assert_eq!(clean_units(&units), "첫 문단\n둘째!");
    }

    #[test]
    fn units_all_empty_gives_empty() {
        let units: [&str; 2] = ["", " \n "];
        assert_eq!(clean_units(&units), "");
    }
}
