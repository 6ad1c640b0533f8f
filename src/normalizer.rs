use std::collections::BTreeMap;

/// Stemmed term (unigram or `_`-joined bigram) to occurrence count.
///
/// Ordered so that anything folding over the terms sees them in the same
/// sequence on every run.
pub type TermFrequencyMap = BTreeMap<String, usize>;

const MIN_TOKEN_LEN: usize = 3;
const MIN_STEMMABLE_LEN: usize = 4;
const MIN_STEM_LEN: usize = 3;

/// Function words plus generic course vocabulary that makes unrelated
/// questions look alike.
static STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "can", "could", "should",
    "would", "what", "when", "where", "who", "why", "how", "i", "you", "we", "they", "my", "your",
    "his", "her", "our", "their", "this", "these", "those", "am", "been", "being", "have", "had",
    "do", "does", "did", "or", "but", "if", "then", "so", "than", "such", "no", "not", "only",
    "same", "just", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "under", "again", "further", "once", "here", "there", "all", "any", "both", "each",
    "few", "more", "most", "other", "some", "own", "get", "make", "go", "know", "take", "see",
    "come", "think", "look", "want", "give", "use", "find", "tell", "ask", "work", "seem", "feel",
    "try", "leave", "call", "need", "also", "back", "because", "become", "well", "even", "new",
    "now", "way", "may", "say", "still", "very", "much", "many", "must", "like", "using",
    "please", "help", "thanks", "question", "problem", "error", "issue", "understand",
    "understanding", "explain", "looking", "learn", "learning",
    // generic programming vocabulary
    "java", "code", "coding", "program", "programming", "project", "example", "examples", "class",
    "classes", "method", "methods", "function", "functions", "object", "objects", "real", "world",
    "basic", "basics", "tutorial", "guide", "sample",
];

/// Suffix rewrites, tried strictly in this order. The first matching suffix
/// wins even when a longer one further down would also match.
static SUFFIX_RULES: &[(&str, &str)] = &[
    ("ational", "ate"),
    ("tional", "tion"),
    ("ization", "ize"),
    ("ation", ""),
    ("ition", ""),
    ("ness", ""),
    ("ment", ""),
    ("able", ""),
    ("ible", ""),
    ("ful", ""),
    ("less", ""),
    ("ous", ""),
    ("ive", ""),
    ("ing", ""),
    ("ed", ""),
    ("er", ""),
    ("est", ""),
    ("ly", ""),
    ("ies", "y"),
    ("es", ""),
    ("s", ""),
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercases and splits `text` into raw tokens. Anything outside
/// `[a-z0-9]` and whitespace acts as a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_ascii_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Applies the first suffix rule that matches `word` and leaves a stem of at
/// least three characters. Words shorter than four characters pass through.
pub fn stem(word: &str) -> String {
    if word.len() < MIN_STEMMABLE_LEN {
        return word.to_string();
    }

    for (suffix, replacement) in SUFFIX_RULES {
        if let Some(root) = word.strip_suffix(suffix) {
            if root.len() + replacement.len() >= MIN_STEM_LEN {
                return format!("{}{}", root, replacement);
            }
        }
    }

    word.to_string()
}

/// Stems of the tokens that survive the length and stopword filters, in
/// source order.
pub fn stemmed_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !is_stopword(token))
        .map(|token| stem(&token))
        .collect()
}

/// Builds the unigram and bigram counts for `text`. Both share one count
/// space; bigrams join adjacent stems with `_`.
pub fn normalize(text: &str) -> TermFrequencyMap {
    let stems = stemmed_terms(text);
    let mut counts = TermFrequencyMap::new();

    for term in &stems {
        if term.len() >= MIN_STEM_LEN {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }
    }

    for pair in stems.windows(2) {
        let bigram = format!("{}_{}", pair[0], pair[1]);
        *counts.entry(bigram).or_insert(0) += 1;
    }

    counts
}
