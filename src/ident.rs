//! Figure/table identifiers.
//!
//! Identifiers keep their textual form exactly as captioned (`"1"`, `"A1"`,
//! `"IV"`, `"S1"`) - a supplementary `"S1"` is never conflated with a main
//! `"1"`. Ordering goes scheme first (main < appendix < Roman <
//! supplementary), then the natural numeric suffix.

use std::cmp::Ordering;
use std::fmt;

/// Numbering scheme of an identifier, with its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `1`, `2`, ...
    Numeric(i32),
    /// `A1`, `B2`, ... (appendix tables/figures)
    Appendix(char, i32),
    /// `I`, `II`, `IV`, ...
    Roman(i32),
    /// `S1`, `S2`, ... including `SIV` (S + Roman)
    Supplementary(i32),
    /// `SA1` and friends, rare but seen in supplements
    SupplementaryAppendix(char, i32),
}

impl Scheme {
    /// Rank used as the primary ordering key.
    fn rank(&self) -> u8 {
        match self {
            Scheme::Numeric(_) => 0,
            Scheme::Appendix(..) => 1,
            Scheme::Roman(_) => 2,
            Scheme::Supplementary(_) => 3,
            Scheme::SupplementaryAppendix(..) => 4,
        }
    }

    fn letter(&self) -> char {
        match self {
            Scheme::Appendix(c, _) | Scheme::SupplementaryAppendix(c, _) => *c,
            _ => '\0',
        }
    }

    fn number(&self) -> i32 {
        match self {
            Scheme::Numeric(n)
            | Scheme::Appendix(_, n)
            | Scheme::Roman(n)
            | Scheme::Supplementary(n)
            | Scheme::SupplementaryAppendix(_, n) => *n,
        }
    }
}

/// An identifier as it appeared in the caption, plus its parsed scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    text: String,
    scheme: Scheme,
}

impl Ident {
    /// Parse the identifier portion of a caption match (already stripped of
    /// the `Figure`/`Table` label). Returns `None` for anything that is not
    /// a recognizable identifier.
    pub fn parse(raw: &str) -> Option<Ident> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let upper = trimmed.to_ascii_uppercase();

        // Supplementary: leading S followed by digits, Roman, or appendix.
        if let Some(rest) = upper.strip_prefix('S') {
            if !rest.is_empty() {
                if let Ok(n) = rest.parse::<i32>() {
                    return Some(Ident {
                        text: upper,
                        scheme: Scheme::Supplementary(n),
                    });
                }
                if let Some(n) = roman_to_int(rest) {
                    return Some(Ident {
                        text: upper,
                        scheme: Scheme::Supplementary(n),
                    });
                }
                let mut chars = rest.chars();
                if let Some(letter) = chars.next() {
                    let digits: String = chars.collect();
                    if letter.is_ascii_alphabetic() && !digits.is_empty() {
                        if let Ok(n) = digits.parse::<i32>() {
                            return Some(Ident {
                                text: upper,
                                scheme: Scheme::SupplementaryAppendix(letter, n),
                            });
                        }
                    }
                }
            }
        }

        // Pure Roman (IV before appendix: "I1" is appendix, "IV" is Roman).
        if let Some(n) = roman_to_int(&upper) {
            return Some(Ident {
                text: upper,
                scheme: Scheme::Roman(n),
            });
        }

        // Appendix letter + digits.
        let mut chars = upper.chars();
        if let Some(first) = chars.next() {
            if first.is_ascii_alphabetic() {
                let digits: String = chars.collect();
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(n) = digits.parse::<i32>() {
                        return Some(Ident {
                            text: upper,
                            scheme: Scheme::Appendix(first, n),
                        });
                    }
                }
            }
        }

        // Plain numeric; keep the text exactly as written ("01" stays "01").
        if let Ok(n) = trimmed.parse::<i32>() {
            return Some(Ident {
                text: trimmed.to_string(),
                scheme: Scheme::Numeric(n),
            });
        }

        None
    }

    /// The textual form, used for filenames and force-direction matching.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_supplementary(&self) -> bool {
        matches!(
            self.scheme,
            Scheme::Supplementary(_) | Scheme::SupplementaryAppendix(..)
        )
    }

    /// Stable sort key: scheme rank, appendix letter, numeric value, text.
    pub fn sort_key(&self) -> (u8, char, i32, String) {
        (
            self.scheme.rank(),
            self.scheme.letter(),
            self.scheme.number(),
            self.text.clone(),
        )
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialOrd for Ident {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ident {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Convert a Roman numeral (I–XX range used by captions) to its value.
/// Returns `None` when the string is not a plausible Roman numeral.
pub fn roman_to_int(s: &str) -> Option<i32> {
    if s.is_empty() || !s.chars().all(|c| matches!(c, 'I' | 'V' | 'X' | 'i' | 'v' | 'x')) {
        return None;
    }
    let value = |c: char| match c.to_ascii_uppercase() {
        'I' => 1,
        'V' => 5,
        'X' => 10,
        _ => 0,
    };
    let mut total = 0;
    let mut prev = 0;
    for c in s.chars().rev() {
        let v = value(c);
        if v < prev {
            total -= v;
        } else {
            total += v;
        }
        prev = v;
    }
    if (1..=20).contains(&total) {
        Some(total)
    } else {
        None
    }
}
