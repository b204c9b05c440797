/// Localized keywords rewritten to the English tokens the extractors expect.
const KEYWORDS: &[(&str, &str)] = &[
    ("اسکلپ", "scalp"),
    ("خرید", "Buy"),
    ("فروش", "Sell"),
];

/// Maps Persian (U+06F0..U+06F9) and Arabic-Indic (U+0660..U+0669) digits to
/// ASCII. Every other character passes through untouched.
pub fn normalize_digits(text: &str) -> String {
    text.chars().map(ascii_digit).collect()
}

fn ascii_digit(c: char) -> char {
    let offset = match c {
        '\u{06F0}'..='\u{06F9}' => c as u32 - 0x06F0,
        '\u{0660}'..='\u{0669}' => c as u32 - 0x0660,
        _ => return c,
    };
    char::from_digit(offset, 10).unwrap_or(c)
}

/// Digit normalization followed by keyword replacement.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = normalize_digits(text);
    for (local, english) in KEYWORDS {
        if out.contains(local) {
            out = out.replace(local, english);
        }
    }
    out
}
