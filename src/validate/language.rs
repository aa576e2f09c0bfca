// src/validate/language.rs
//! Lightweight language guess: script ranges first, then stop-word hits.
//! Good enough to gate an allow-list; not a general-purpose detector.

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "in", "is", "that", "for", "was", "on", "with", "are",
            "by", "this", "from", "at", "have", "has", "were", "been", "after", "will",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "que", "y", "en", "un", "una", "por", "con", "para",
            "del", "se", "es", "fue", "según",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "des", "et", "en", "un", "une", "du", "est", "que", "pour",
            "dans", "sur", "pas", "avec", "été",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "nicht", "den", "mit", "von", "sich", "auf", "für",
            "ein", "eine", "wurde", "auch",
        ],
    ),
    (
        "it",
        &[
            "il", "di", "che", "e", "la", "per", "gli", "della", "con", "non", "sono", "nel",
            "una", "anche", "è",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "de", "que", "e", "do", "da", "em", "um", "uma", "para", "com", "não",
            "foi", "pelo", "pela",
        ],
    ),
];

const MIN_STOPWORD_HITS: usize = 2;

/// ISO 639-1 code, or `None` when the text gives too little signal.
pub fn detect_language(text: &str) -> Option<&'static str> {
    if let Some(lang) = detect_by_script(text) {
        return Some(lang);
    }

    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (lang, words) in STOPWORDS {
        let hits = tokens
            .iter()
            .filter(|t| words.iter().any(|w| *w == t.as_str()))
            .count();
        if hits >= MIN_STOPWORD_HITS && best.map_or(true, |(_, b)| hits > b) {
            best = Some((*lang, hits));
        }
    }
    best.map(|(lang, _)| lang)
}

fn detect_by_script(text: &str) -> Option<&'static str> {
    let mut letters = 0usize;
    let (mut cyrillic, mut arabic, mut han, mut kana, mut hangul) = (0, 0, 0, 0, 0);
    let mut ukrainian_marks = false;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        match c {
            '\u{0400}'..='\u{04FF}' => {
                cyrillic += 1;
                if matches!(c, 'і' | 'ї' | 'є' | 'ґ' | 'І' | 'Ї' | 'Є' | 'Ґ') {
                    ukrainian_marks = true;
                }
            }
            '\u{0600}'..='\u{06FF}' => arabic += 1,
            '\u{3040}'..='\u{30FF}' => kana += 1,
            '\u{4E00}'..='\u{9FFF}' => han += 1,
            '\u{AC00}'..='\u{D7AF}' => hangul += 1,
            _ => {}
        }
    }
    if letters == 0 {
        return None;
    }
    let dominant = |n: usize| n * 2 > letters;
    if dominant(cyrillic) {
        Some(if ukrainian_marks { "uk" } else { "ru" })
    } else if dominant(arabic) {
        Some("ar")
    } else if kana > 0 && dominant(kana + han) {
        Some("ja")
    } else if dominant(han) {
        Some("zh")
    } else if dominant(hangul) {
        Some("ko")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_languages() {
        assert_eq!(
            detect_language("The storm hit the coast and damaged homes in the region"),
            Some("en")
        );
        assert_eq!(
            detect_language("El presidente de la república habló con los periodistas"),
            Some("es")
        );
        assert_eq!(
            detect_language("Die Regierung hat das Gesetz nicht mit der Opposition besprochen"),
            Some("de")
        );
        assert_eq!(detect_language("Влада оголосила про нові обмеження"), Some("uk"));
        assert_eq!(detect_language("地震发生在北京附近"), Some("zh"));
    }

    #[test]
    fn too_little_signal_is_none() {
        assert_eq!(detect_language("12345 !!!"), None);
        assert_eq!(detect_language("Kyiv Lviv Odesa"), None);
    }
}
