// Pronunciation dictionary and CI-phone set.
//
// Words map to sequences of context-independent phone ids. Alternate
// pronunciations use the `WORD(2)` naming convention and are chained from
// their base word so the decoder can enumerate them. Filler words (silence,
// breath noise, ...) carry a flag; by convention words written `<...>` or
// `++...++` are fillers.

use hashbrown::HashMap;

use crate::FsgError;

/// Context-independent phone identifier.
pub type PhoneId = usize;

/// Dictionary word identifier.
pub type DictWordId = u32;

/// The CI-phone symbol table.
///
/// The silence phone `SIL` always exists at index 0; the decoder uses it as
/// the left context of the utterance-start sentinel.
pub struct PhoneSet {
    names: Vec<String>,
    index: HashMap<String, PhoneId>,
}

pub const SILENCE_PHONE_NAME: &str = "SIL";

impl PhoneSet {
    pub fn new() -> Self {
        let mut set = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };
        set.add(SILENCE_PHONE_NAME);
        set
    }

    /// Look up a phone id, adding the phone if missing.
    pub fn add(&mut self, name: &str) -> PhoneId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<PhoneId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: PhoneId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Id of the silence phone.
    pub fn silence(&self) -> PhoneId {
        0
    }
}

impl Default for PhoneSet {
    fn default() -> Self {
        Self::new()
    }
}

struct DictWord {
    text: String,
    phones: Vec<PhoneId>,
    filler: bool,
    /// Next word in this word's alternate-pronunciation chain.
    alt: Option<DictWordId>,
    /// Base word of the chain (self for base words).
    base: DictWordId,
}

/// The pronunciation dictionary.
pub struct Dict {
    phones: PhoneSet,
    words: Vec<DictWord>,
    index: HashMap<String, DictWordId>,
}

impl Dict {
    pub fn new(phones: PhoneSet) -> Self {
        Self {
            phones,
            words: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load a dictionary from text: one `WORD PHONE PHONE ...` entry per
    /// line, `#` comments. Unknown phones are added to the phone set.
    /// Words written `<...>` or `++...++` are fillers.
    pub fn from_text(text: &str, phones: PhoneSet) -> Result<Self, FsgError> {
        let mut dict = Self::new(phones);
        for (idx, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let word = fields.next().unwrap_or_default().to_string();
            let pron: Vec<PhoneId> = fields.map(|p| dict.phones.add(p)).collect();
            if pron.is_empty() {
                return Err(FsgError::Parse {
                    line: idx + 1,
                    msg: format!("word `{word}` has no pronunciation"),
                });
            }
            let filler = is_filler_spelling(&word);
            dict.add_word(&word, &pron, filler)?;
        }
        Ok(dict)
    }

    /// Add a word with its pronunciation. A word spelled `BASE(n)` is
    /// chained as an alternate pronunciation of `BASE` when the base word
    /// exists.
    pub fn add_word(
        &mut self,
        text: &str,
        phones: &[PhoneId],
        filler: bool,
    ) -> Result<DictWordId, FsgError> {
        if self.index.contains_key(text) {
            return Err(FsgError::DuplicateWord(text.to_string()));
        }
        if phones.is_empty() {
            return Err(FsgError::Parse {
                line: 0,
                msg: format!("word `{text}` has no pronunciation"),
            });
        }
        for &p in phones {
            if p >= self.phones.len() {
                return Err(FsgError::UnknownPhone(format!("phone id {p}")));
            }
        }

        let wid = self.words.len() as DictWordId;
        let base = self
            .alt_base_name(text)
            .and_then(|b| self.index.get(b).copied())
            .unwrap_or(wid);
        self.words.push(DictWord {
            text: text.to_string(),
            phones: phones.to_vec(),
            filler,
            alt: None,
            base,
        });
        self.index.insert(text.to_string(), wid);

        // Chain alternates from the base word.
        if base != wid {
            let mut cur = base;
            while let Some(next) = self.words[cur as usize].alt {
                cur = next;
            }
            self.words[cur as usize].alt = Some(wid);
        }
        Ok(wid)
    }

    pub fn n_words(&self) -> usize {
        self.words.len()
    }

    pub fn to_id(&self, word: &str) -> Option<DictWordId> {
        self.index.get(word).copied()
    }

    pub fn word_str(&self, wid: DictWordId) -> Option<&str> {
        self.words.get(wid as usize).map(|w| w.text.as_str())
    }

    /// Pronunciation length in phones.
    pub fn pronlen(&self, wid: DictWordId) -> usize {
        self.words
            .get(wid as usize)
            .map(|w| w.phones.len())
            .unwrap_or(0)
    }

    pub fn pron(&self, wid: DictWordId) -> &[PhoneId] {
        self.words
            .get(wid as usize)
            .map(|w| w.phones.as_slice())
            .unwrap_or(&[])
    }

    /// Next alternate pronunciation in the word's chain.
    pub fn next_alt(&self, wid: DictWordId) -> Option<DictWordId> {
        self.words.get(wid as usize).and_then(|w| w.alt)
    }

    /// Base word of an alternate-pronunciation chain.
    pub fn base_wid(&self, wid: DictWordId) -> DictWordId {
        self.words.get(wid as usize).map(|w| w.base).unwrap_or(wid)
    }

    pub fn is_filler(&self, wid: DictWordId) -> bool {
        self.words
            .get(wid as usize)
            .map(|w| w.filler)
            .unwrap_or(false)
    }

    pub fn phones(&self) -> &PhoneSet {
        &self.phones
    }

    /// `BASE(n)` -> `BASE`; anything else has no alternate base.
    fn alt_base_name<'a>(&self, text: &'a str) -> Option<&'a str> {
        let open = text.find('(')?;
        if text.ends_with(')') && open > 0 {
            Some(&text[..open])
        } else {
            None
        }
    }
}

fn is_filler_spelling(word: &str) -> bool {
    (word.starts_with('<') && word.ends_with('>'))
        || (word.starts_with("++") && word.ends_with("++"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dict() -> Dict {
        let mut phones = PhoneSet::new();
        let r = phones.add("R");
        let iy = phones.add("IY");
        let eh = phones.add("EH");
        let d = phones.add("D");
        let sil = phones.silence();

        let mut dict = Dict::new(phones);
        dict.add_word("<sil>", &[sil], true).unwrap();
        dict.add_word("READ", &[r, iy, d], false).unwrap();
        dict.add_word("READ(2)", &[r, eh, d], false).unwrap();
        dict.add_word("RED", &[r, eh, d], false).unwrap();
        dict
    }

    #[test]
    fn phone_set_has_silence_at_zero() {
        let phones = PhoneSet::new();
        assert_eq!(phones.silence(), 0);
        assert_eq!(phones.name(0), Some("SIL"));
        assert_eq!(phones.id("SIL"), Some(0));
    }

    #[test]
    fn phone_add_is_idempotent() {
        let mut phones = PhoneSet::new();
        let a = phones.add("AA");
        assert_eq!(phones.add("AA"), a);
        assert_eq!(phones.len(), 2);
    }

    #[test]
    fn lookup_and_pronunciations() {
        let dict = test_dict();
        let wid = dict.to_id("READ").unwrap();
        assert_eq!(dict.word_str(wid), Some("READ"));
        assert_eq!(dict.pronlen(wid), 3);
        assert_eq!(dict.to_id("WRITE"), None);
        assert!(dict.is_filler(dict.to_id("<sil>").unwrap()));
        assert!(!dict.is_filler(wid));
    }

    #[test]
    fn alternate_chain_links_to_base() {
        let dict = test_dict();
        let base = dict.to_id("READ").unwrap();
        let alt = dict.to_id("READ(2)").unwrap();
        assert_eq!(dict.next_alt(base), Some(alt));
        assert_eq!(dict.next_alt(alt), None);
        assert_eq!(dict.base_wid(alt), base);
        assert_eq!(dict.base_wid(base), base);
        // A plain word is not anyone's alternate.
        let red = dict.to_id("RED").unwrap();
        assert_eq!(dict.base_wid(red), red);
    }

    #[test]
    fn duplicate_word_is_rejected() {
        let mut dict = test_dict();
        let r = dict.phones.id("R").unwrap();
        assert!(matches!(
            dict.add_word("READ", &[r], false),
            Err(FsgError::DuplicateWord(_))
        ));
    }

    #[test]
    fn from_text_parses_and_flags_fillers() {
        let text = "\
# tiny dictionary
<sil>   SIL
++um++  AH M
HELLO   HH AH L OW
WORLD   W ER L D
";
        let dict = Dict::from_text(text, PhoneSet::new()).unwrap();
        assert_eq!(dict.n_words(), 4);
        assert!(dict.is_filler(dict.to_id("<sil>").unwrap()));
        assert!(dict.is_filler(dict.to_id("++um++").unwrap()));
        assert!(!dict.is_filler(dict.to_id("HELLO").unwrap()));
        assert_eq!(dict.pronlen(dict.to_id("HELLO").unwrap()), 4);
    }

    #[test]
    fn from_text_rejects_empty_pronunciation() {
        assert!(Dict::from_text("WORD\n", PhoneSet::new()).is_err());
    }
}
