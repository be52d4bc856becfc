//! Local language heuristic: pure, deterministic, no I/O.
//!
//! Tiers, strongest first:
//!
//! 1. Language-specific letters. Uzbek Latin `o'`/`g'` digraphs (any
//!    apostrophe variant) and the Uzbek Cyrillic letters `ў қ ғ ҳ` mean
//!    Uzbek; `ы щ` (absent from Uzbek Cyrillic) mean Russian.
//! 2. Word-list hits. The language with strictly the most hits wins.
//! 3. Latin word shapes. Uzbek words carry `q` without `u`, a leading `x`
//!    or agglutinative endings (`-lar`, `-ning`, `-ga`, `-di`); English
//!    words carry letters and clusters Uzbek Latin lacks (`w`, `c`
//!    outside `ch`, `th`, `qu`, `ee`) or English endings. Strictly more
//!    marks wins.
//! 4. Script ratio. At least 60% Cyrillic letters means Russian.
//!
//! Latin script alone says nothing about the language; anything weaker
//! than the tiers above is undetermined.

use std::cmp::Ordering;

use kidvox_core::Language;

/// Apostrophe variants used for the Uzbek Latin `oʻ`/`gʻ` digraphs.
const APOSTROPHES: [char; 5] = ['\'', '\u{02BB}', '\u{02BC}', '\u{2018}', '\u{2019}'];

const UZBEK_CYRILLIC: [char; 4] = ['ў', 'қ', 'ғ', 'ҳ'];

const RUSSIAN_ONLY: [char; 2] = ['ы', 'щ'];

const UZBEK_WORDS: &[&str] = &[
    // Function words
    "va", "bu", "shu", "u", "uchun", "bilan", "emas", "men", "sen", "biz", "siz", "ular", "bir",
    "ikki", "uch", "edi", "ham", "lekin", "yoki", "nima", "kim", "qayerda", "qanday", "necha",
    "qachon", "nega", "ha", "bor", "juda", "yana", "endi", "keyin", "oldin", "hamma", "har",
    "mana", "qani", "kel", "ber", "ol",
    // Everyday and lesson vocabulary
    "olma", "nok", "uzum", "non", "suv", "sut", "uy", "ona", "ota", "bola", "bolalar", "kitob",
    "daftar", "maktab", "mushuk", "qush", "gul", "daraxt", "quyosh", "oy", "yulduz", "katta",
    "kichik", "yaxshi", "chiroyli", "qizil", "sariq", "yashil", "oq", "qora", "salom", "rahmat",
    "xayr", "bugun", "ertaga", "kecha", "yil", "kun", "stol", "eshik", "deraza", "ot", "sigir",
    "baliq", "tulki", "ayiq", "quyon",
    // Cyrillic
    "ва", "бу", "учун", "билан", "эмас", "мен", "бир", "эди", "ҳам", "лекин",
];

const RUSSIAN_WORDS: &[&str] = &[
    "и", "в", "не", "на", "что", "я", "он", "с", "это", "как", "но", "по",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "and", "is", "a", "to", "of", "in", "it", "you", "that", "this", "what", "where",
    "who", "he", "she", "we", "they", "are", "was", "my", "your", "his", "her", "with", "for",
    "on", "at", "can", "see", "look", "here", "there", "yes", "no", "not", "do", "does",
];

/// Endings of inflected Uzbek words.
const UZBEK_ENDINGS: &[&str] = &[
    "lar", "ning", "dagi", "ni", "da", "ga", "dan", "di", "gan", "moq", "lik", "chi", "yapti",
];

/// Endings of inflected English words.
const ENGLISH_ENDINGS: &[&str] = &["ing", "tion", "ed", "ly", "ness", "ful"];

/// Shortest word whose ending is trusted.
const MIN_ENDING_WORD: usize = 4;

/// Minimum letters before script ratios are trusted.
const MIN_RATIO_LETTERS: usize = 3;

/// Share of Cyrillic letters needed to decide by ratio.
const SCRIPT_RATIO_FLOOR: f64 = 0.6;

/// Guess the language of `text` from its first `prefix_chars` characters.
///
/// Returns `None` for empty or letterless text and whenever no tier is
/// decisive.
#[must_use]
pub fn detect_language(text: &str, prefix_chars: usize) -> Option<Language> {
    let prefix: String = text.chars().take(prefix_chars).collect::<String>().to_lowercase();
    if !prefix.chars().any(char::is_alphabetic) {
        return None;
    }

    by_letters(&prefix)
        .or_else(|| by_word_lists(&prefix))
        .or_else(|| by_word_shapes(&prefix))
        .or_else(|| by_script_ratio(&prefix))
}

fn by_letters(text: &str) -> Option<Language> {
    if has_uzbek_digraph(text) || text.chars().any(|c| UZBEK_CYRILLIC.contains(&c)) {
        return Some(Language::Uzbek);
    }
    if text.chars().any(|c| RUSSIAN_ONLY.contains(&c)) {
        return Some(Language::Russian);
    }
    None
}

/// `o'` or `g'` followed by a letter, e.g. `o'ynaydi`, `g'isht`.
fn has_uzbek_digraph(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(3).any(|w| {
        matches!(w[0], 'o' | 'g') && APOSTROPHES.contains(&w[1]) && w[2].is_alphabetic()
    })
}

fn by_word_lists(text: &str) -> Option<Language> {
    let mut counts = [0_usize; 3];
    for word in words(text) {
        for (slot, list) in [UZBEK_WORDS, RUSSIAN_WORDS, ENGLISH_WORDS]
            .iter()
            .enumerate()
        {
            if list.contains(&word) {
                counts[slot] += 1;
            }
        }
    }

    let best = counts.iter().copied().max().unwrap_or(0);
    if best == 0 || counts.iter().filter(|&&c| c == best).count() > 1 {
        return None;
    }
    counts
        .iter()
        .position(|&c| c == best)
        .map(|i| Language::ALL[i])
}

fn by_word_shapes(text: &str) -> Option<Language> {
    let (mut uzbek, mut english) = (0_usize, 0_usize);
    for word in words(text).filter(|w| w.chars().all(|c| c.is_ascii_alphabetic())) {
        let chars: Vec<char> = word.chars().collect();
        if has_uzbek_shape(word, &chars) {
            uzbek += 1;
        }
        if has_english_shape(word, &chars) {
            english += 1;
        }
    }

    match uzbek.cmp(&english) {
        Ordering::Greater => Some(Language::Uzbek),
        Ordering::Less => Some(Language::English),
        Ordering::Equal => None,
    }
}

fn has_uzbek_shape(word: &str, chars: &[char]) -> bool {
    let lone_q = chars
        .iter()
        .enumerate()
        .any(|(i, &c)| c == 'q' && chars.get(i + 1) != Some(&'u'));
    lone_q || word.starts_with('x') || has_ending(chars.len(), word, UZBEK_ENDINGS)
}

fn has_english_shape(word: &str, chars: &[char]) -> bool {
    let lone_c = chars
        .iter()
        .enumerate()
        .any(|(i, &c)| c == 'c' && chars.get(i + 1) != Some(&'h'));
    let doubled_end = matches!(chars, [.., a, b] if a == b && !is_vowel(*a));
    let consonant_y_end = matches!(chars, [.., a, 'y'] if !is_vowel(*a));

    word.contains('w')
        || lone_c
        || ["th", "qu", "ee", "oo"].iter().any(|cluster| word.contains(*cluster))
        || doubled_end
        || consonant_y_end
        || has_ending(chars.len(), word, ENGLISH_ENDINGS)
}

fn has_ending(len: usize, word: &str, endings: &[&str]) -> bool {
    len >= MIN_ENDING_WORD && endings.iter().any(|ending| word.ends_with(ending))
}

const fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn by_script_ratio(text: &str) -> Option<Language> {
    let (mut cyrillic, mut latin) = (0_usize, 0_usize);
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        if is_cyrillic(c) {
            cyrillic += 1;
        } else if c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c) {
            latin += 1;
        }
    }

    let letters = cyrillic + latin;
    if letters < MIN_RATIO_LETTERS {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let share = cyrillic as f64 / letters as f64;
    (share >= SCRIPT_RATIO_FLOOR).then_some(Language::Russian)
}

const fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphabetic() || APOSTROPHES.contains(&c)))
        .map(|w| w.trim_matches(|c: char| APOSTROPHES.contains(&c)))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: usize = 1000;

    #[test]
    fn uzbek_latin_digraph_wins() {
        assert_eq!(
            detect_language("Mushuk uyda o'ynaydi", PREFIX),
            Some(Language::Uzbek)
        );
        assert_eq!(
            detect_language("G\u{02BB}isht uy", PREFIX),
            Some(Language::Uzbek)
        );
    }

    #[test]
    fn uzbek_cyrillic_letters_win_over_russian_ratio() {
        assert_eq!(
            detect_language("Мушук уйда ўйнайди", PREFIX),
            Some(Language::Uzbek)
        );
    }

    #[test]
    fn russian_specific_letters() {
        assert_eq!(
            detect_language("Мы играли в саду", PREFIX),
            Some(Language::Russian)
        );
    }

    #[test]
    fn stop_words_decide_when_no_letters_do() {
        assert_eq!(
            detect_language("Bu kitob va daftar", PREFIX),
            Some(Language::Uzbek)
        );
        assert_eq!(
            detect_language("The cat and the dog", PREFIX),
            Some(Language::English)
        );
        assert_eq!(
            detect_language("Кот и собака на улице", PREFIX),
            Some(Language::Russian)
        );
    }

    #[test]
    fn uzbek_latin_without_apostrophe() {
        for text in [
            "Olma qizil",
            "Kitob stolda turibdi",
            "Qush uchadi",
            "Bola maktabga bordi",
            "Daraxtlar yashil",
            "Xona toza",
        ] {
            assert_eq!(detect_language(text, PREFIX), Some(Language::Uzbek), "{text}");
        }
    }

    #[test]
    fn english_needs_english_evidence() {
        assert_eq!(detect_language("Ball", PREFIX), Some(Language::English));
        assert_eq!(
            detect_language("Quick brown fox jumping", PREFIX),
            Some(Language::English)
        );
        assert_eq!(detect_language("Happy birthday", PREFIX), Some(Language::English));
    }

    #[test]
    fn latin_script_alone_is_undetermined() {
        assert_eq!(detect_language("Banana", PREFIX), None);
        assert_eq!(detect_language("Mama papa", PREFIX), None);
    }

    #[test]
    fn cyrillic_ratio_is_last_resort() {
        assert_eq!(detect_language("Кошка", PREFIX), Some(Language::Russian));
    }

    #[test]
    fn too_few_letters_is_undetermined() {
        assert_eq!(detect_language("B", PREFIX), None);
        assert_eq!(detect_language("Ok", PREFIX), None);
    }

    #[test]
    fn empty_or_letterless_is_undetermined() {
        assert_eq!(detect_language("", PREFIX), None);
        assert_eq!(detect_language("   ", PREFIX), None);
        assert_eq!(detect_language("123 !?", PREFIX), None);
    }

    #[test]
    fn only_the_prefix_is_inspected() {
        let text = format!("{}Mushuk o'ynaydi", "the ".repeat(PREFIX / 4));
        assert_eq!(detect_language(&text, PREFIX), Some(Language::English));
    }

    #[test]
    fn detection_is_deterministic() {
        let text = "Olma, nok va uzum o'sadi";
        let first = detect_language(text, PREFIX);
        for _ in 0..10 {
            assert_eq!(detect_language(text, PREFIX), first);
        }
    }
}
