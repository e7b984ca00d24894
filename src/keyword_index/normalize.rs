//! Query and keyword normalization
//!
//! Both sides of a match go through the same normalizer so that comparisons
//! are plain byte comparisons on the normalized form.

/// Locale-aware text normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Letters that are distinct in this locale and must not be folded
    preserved: &'static [char],
}

impl Normalizer {
    pub fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(['-', '_'])
            .next()
            .unwrap_or(locale)
            .to_ascii_lowercase();

        let preserved: &'static [char] = match language.as_str() {
            "sv" | "fi" => &['å', 'ä', 'ö'],
            "da" | "nb" | "nn" | "no" => &['æ', 'ø', 'å'],
            "de" => &['ä', 'ö', 'ü', 'ß'],
            "es" => &['ñ'],
            _ => &[],
        };

        Self { preserved }
    }

    /// Lowercase, fold diacritics, turn punctuation into spaces and collapse whitespace
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut pending_space = false;

        for ch in text.chars().flat_map(char::to_lowercase) {
            if ch.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if self.preserved.contains(&ch) {
                    out.push(ch);
                } else {
                    push_folded(&mut out, ch);
                }
            } else if is_combining_mark(ch) {
                // decomposed input: recompose a preserved letter, otherwise drop the mark
                if !pending_space
                    && let Some(composed) = out
                        .chars()
                        .next_back()
                        .and_then(|base| compose(base, ch))
                        .filter(|c| self.preserved.contains(c))
                {
                    out.pop();
                    out.push(composed);
                }
            } else if ch == '\'' || ch == '\u{2019}' {
                // apostrophes join ("don't" -> "dont")
            } else {
                pending_space = true;
            }
        }

        out
    }

    /// Normalized whitespace-separated tokens
    pub fn tokens(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn is_combining_mark(ch: char) -> bool {
    matches!(
        ch,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}

/// Canonical composition for the letters some locales keep distinct
fn compose(base: char, mark: char) -> Option<char> {
    match (base, mark) {
        ('a', '\u{030A}') => Some('å'),
        ('a', '\u{0308}') => Some('ä'),
        ('o', '\u{0308}') => Some('ö'),
        ('u', '\u{0308}') => Some('ü'),
        ('n', '\u{0303}') => Some('ñ'),
        _ => None,
    }
}

fn push_folded(out: &mut String, ch: char) {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ř' => "r",
        'ś' | 'š' => "s",
        'ť' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        'þ' => "th",
        _ => {
            out.push(ch);
            return;
        }
    };
    out.push_str(folded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("en", "  Brush   TEETH! ", "brush teeth")]
    #[case("en", "Café crème", "cafe creme")]
    #[case("es", "Niño pequeño", "niño pequeño")]
    #[case("fr", "Niño", "nino")]
    #[case("sv", "Äta frukost", "äta frukost")]
    #[case("sv-SE", "Gå ut", "gå ut")]
    #[case("en", "Gå ut", "ga ut")]
    #[case("da", "Smørrebrød", "smørrebrød")]
    #[case("en", "don't stop", "dont stop")]
    #[case("en", "wake-up", "wake up")]
    #[case("en", "", "")]
    #[case("en", "re\u{301}sume\u{301}", "resume")]
    #[case("tr", "İstanbul", "istanbul")]
    #[case("en", "Ga\u{30A} ut", "ga ut")]
    #[case("sv", "Ga\u{30A} ut", "gå ut")]
    #[case("es", "nin\u{303}o", "niño")]
    fn test_normalize(#[case] locale: &str, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(Normalizer::for_locale(locale).normalize(input), expected);
    }

    #[test]
    fn test_tokens() {
        let normalizer = Normalizer::for_locale("en");
        assert_eq!(
            normalizer.tokens("Go to school, then PLAY"),
            vec!["go", "to", "school", "then", "play"]
        );
        assert!(normalizer.tokens(" ... ").is_empty());
    }
}
