use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"(?i)(?:http|www)\S+").expect("valid regex");
    static ref DEFAULT: Normalizer = Normalizer::default();
}

/// Standard English stopwords. Contraction fragments ("don", "t") are listed
/// because apostrophes are split out before the lookup.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "i","me","my","myself","we","our","ours","ourselves","you","your","yours","yourself","yourselves",
    "he","him","his","himself","she","her","hers","herself","it","its","itself",
    "they","them","their","theirs","themselves","what","which","who","whom","this","that","these","those",
    "am","is","are","was","were","be","been","being","have","has","had","having","do","does","did","doing",
    "a","an","the","and","but","if","or","because","as","until","while","of","at","by","for","with",
    "about","against","between","into","through","during","before","after","above","below","to","from",
    "up","down","in","out","on","off","over","under","again","further","then","once","here","there",
    "when","where","why","how","all","any","both","each","few","more","most","other","some","such",
    "no","nor","not","only","own","same","so","than","too","very","s","t","can","will","just","don",
    "should","now","d","ll","m","o","re","ve","y","ain","aren","couldn","didn","doesn","hadn","hasn",
    "haven","isn","ma","mightn","mustn","needn","shan","shouldn","wasn","weren","won","wouldn",
];

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub tokens: Vec<String>,
    pub text: String,
}

/// Turns raw feed text into cleaned tokens. Immutable after construction and
/// safe to share across threads.
pub struct Normalizer {
    stopwords: HashSet<String>,
    stemmer: Option<Stemmer>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS.iter().map(|s| s.to_string()), false)
    }
}

impl Normalizer {
    pub fn new<I>(stopwords: I, stemming: bool) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            stopwords: stopwords.into_iter().map(|w| w.to_lowercase()).collect(),
            stemmer: stemming.then(|| Stemmer::create(Algorithm::English)),
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// NFKC-fold, strip URLs, blank out everything that is not a letter,
    /// lowercase, split on whitespace and drop stopwords.
    pub fn normalize(&self, raw: &str) -> Normalized {
        let folded = raw.nfkc().collect::<String>();
        let without_urls = URL_RE.replace_all(&folded, " ");
        let letters: String = without_urls
            .chars()
            .map(|c| if c.is_alphabetic() { c } else { ' ' })
            .collect();
        let lowered = letters.to_lowercase();

        let mut tokens = Vec::new();
        for token in lowered.split_whitespace() {
            if self.is_stopword(token) {
                continue;
            }
            match &self.stemmer {
                Some(stemmer) => tokens.push(stemmer.stem(token).into_owned()),
                None => tokens.push(token.to_string()),
            }
        }
        let text = tokens.join(" ");
        Normalized { tokens, text }
    }
}

/// Normalize with the default stopword list and no stemming.
pub fn normalize(raw: &str) -> Normalized {
    DEFAULT.normalize(raw)
}
