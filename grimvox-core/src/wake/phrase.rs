//! Case-insensitive whole-word phrase matching, shared by wake and stop
//! checks.

const FILLER_WORDS: &[&str] = &[
    "um", "uh", "er", "ah", "well", "so", "now", "can", "could", "would",
];

const MIN_QUESTION_WORDS: usize = 3;

/// Words a command utterance may carry besides the phrase itself
/// ("stop it now", "oh shut up").
const COMMAND_EXTRA_WORDS: usize = 2;

#[derive(Debug, Clone)]
struct Phrase {
    text: String,
    words: Vec<String>,
}

/// Matches transcripts against a fixed phrase list, word by word.
#[derive(Debug, Clone, Default)]
pub struct PhraseMatcher {
    phrases: Vec<Phrase>,
    /// When set, the transcript may hold at most this many words beyond the
    /// phrase.
    max_extra_words: Option<usize>,
}

impl PhraseMatcher {
    /// Matches a phrase anywhere in the transcript.
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .filter_map(|p| {
                    let words = words(p.as_ref());
                    (!words.is_empty()).then(|| Phrase {
                        text: p.as_ref().trim().to_lowercase(),
                        words,
                    })
                })
                .collect(),
            max_extra_words: None,
        }
    }

    /// Matches only short utterances that are essentially the phrase, so
    /// "stop" ends a conversation but "when does the bus stop run" does not.
    pub fn commands<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            max_extra_words: Some(COMMAND_EXTRA_WORDS),
            ..Self::new(phrases)
        }
    }

    /// The first configured phrase found in `text`, if any.
    pub fn find(&self, text: &str) -> Option<&str> {
        let heard = words(text);
        self.phrases
            .iter()
            .find(|p| {
                let short_enough = self
                    .max_extra_words
                    .map_or(true, |extra| heard.len() <= p.words.len() + extra);
                short_enough && heard.windows(p.words.len()).any(|w| w == p.words.as_slice())
            })
            .map(|p| p.text.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

fn is_filler(token: &str) -> bool {
    let bare = token.trim_matches(|c: char| ".,!?:;".contains(c));
    bare.is_empty() || FILLER_WORDS.contains(&bare.to_lowercase().as_str())
}

/// Pull a question out of the text that follows `phrase` in `transcript`.
///
/// Leading filler words and punctuation-only tokens are dropped; the rest is
/// returned only if at least three words remain.
pub fn extract_question(transcript: &str, phrase: &str) -> Option<String> {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return None;
    }
    let lowered = transcript.to_lowercase();
    let start = lowered
        .match_indices(phrase.as_str())
        .map(|(i, _)| i)
        .find(|&i| {
            let before = lowered[..i].chars().next_back();
            let after = lowered[i + phrase.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })?;
    let end = start + phrase.len();

    // Lowercasing can change byte lengths outside ASCII; slice whichever text
    // the offsets were computed against.
    let tail = if lowered.len() == transcript.len() && transcript.is_char_boundary(end) {
        &transcript[end..]
    } else {
        &lowered[end..]
    };

    let words: Vec<&str> = tail
        .split_whitespace()
        .skip_while(|w| is_filler(w))
        .collect();

    (words.len() >= MIN_QUESTION_WORDS).then(|| words.join(" "))
}
