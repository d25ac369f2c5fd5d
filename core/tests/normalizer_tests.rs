use pulse_core::normalizer::{normalize, Normalizer};

#[test]
fn it_removes_urls_punctuation_digits_and_stopwords() {
    let n = Normalizer::new(vec!["now".to_string()], false);
    assert_eq!(n.normalize("Check http://x.co NOW!! 123").tokens, vec!["check"]);
}

#[test]
fn it_filters_default_stopwords() {
    let words = normalize("The quick brown fox and the lazy dog").tokens;
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazy", "dog"]);
}

#[test]
fn it_strips_www_links_hashtags_and_mentions() {
    let out = normalize("Loving #RustLang via @ferris www.rust-lang.org/learn https://t.co/abc");
    assert_eq!(out.tokens, vec!["loving", "rustlang", "via", "ferris"]);
    assert_eq!(out.text, "loving rustlang via ferris");
}

#[test]
fn it_splits_contractions_and_underscores() {
    // apostrophes and underscores are not letters; the fragments are stopwords
    let out = normalize("Don't stop_believing");
    assert_eq!(out.tokens, vec!["stop", "believing"]);
}

#[test]
fn it_folds_compatibility_forms() {
    // fullwidth letters and ligatures fold under NFKC
    let out = normalize("ＲＵＳＴ ﬁle");
    assert_eq!(out.tokens, vec!["rust", "file"]);
}

#[test]
fn it_is_deterministic_and_total() {
    let text = "Same input → same output?! 😀 ünïcödé";
    assert_eq!(normalize(text), normalize(text));
    assert_eq!(normalize("😀 🚀 1234 ...").tokens, Vec::<String>::new());
}
