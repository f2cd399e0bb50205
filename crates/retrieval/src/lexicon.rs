//! Domain lexicon: stop words, intent words, synonyms and boosted terms
//!
//! The built-in lists are tuned for the bilingual MoMo corpus. A TOML file
//! can replace any of them (`retrieval.lexicon_path`).

use crate::normalize::normalize;
use momochat_common::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Word lists consulted by keyword extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    /// Dropped from queries and chunk keyword sets
    #[serde(default = "default_stop_words")]
    pub stop_words: HashSet<String>,

    /// Question words kept even when they are stop words
    #[serde(default = "default_intent_words")]
    pub intent_words: HashSet<String>,

    /// Query-side expansions, keyed by normalized token
    #[serde(default = "default_synonyms")]
    pub synonyms: HashMap<String, Vec<String>>,

    /// Brand names, product codes and currency markers
    #[serde(default = "default_domain_terms")]
    pub domain_terms: HashSet<String>,
}

const STOP_WORDS: &[&str] = &[
    // English
    "the", "is", "are", "what", "how", "to", "a", "an", "and", "or", "of", "for", "in", "on",
    // French
    "le", "la", "les", "un", "une", "des", "et", "ou", "de", "du", "pour", "par", "avec", "dans",
    "comment",
];

const INTENT_WORDS: &[&str] = &["what", "how", "why", "when", "where"];

const SYNONYMS: &[(&str, &[&str])] = &[
    ("desactiver", &["unsubscribe", "disable", "deactivate", "se désabonner", "desinscrire"]),
    ("desinscrire", &["unsubscribe", "desactiver"]),
    ("solde", &["balance", "soldes"]),
    ("pret", &["loan", "advance", "avance"]),
    ("avance", &["loan", "advance", "pret"]),
    ("recharger", &["topup", "recharge"]),
    ("code", &["pin", "code"]),
    ("loan", &["xtracash", "xtra cash", "pret"]),
];

const DOMAIN_TERMS: &[&str] = &[
    "momo", "mtn", "momopay", "momoapp", "xtracash", "banktech", "ecw", "ussd",
    "fcfa", "xaf", "pin", "advance", "remittance", "reversal",
];

fn default_stop_words() -> HashSet<String> {
    STOP_WORDS.iter().map(|w| w.to_string()).collect()
}

fn default_intent_words() -> HashSet<String> {
    INTENT_WORDS.iter().map(|w| w.to_string()).collect()
}

fn default_synonyms() -> HashMap<String, Vec<String>> {
    SYNONYMS
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

fn default_domain_terms() -> HashSet<String> {
    DOMAIN_TERMS.iter().map(|w| w.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            stop_words: default_stop_words(),
            intent_words: default_intent_words(),
            synonyms: default_synonyms(),
            domain_terms: default_domain_terms(),
        }
    }
}

impl Lexicon {
    /// Load a lexicon file; missing lists keep their built-in values
    pub fn from_file(path: &str) -> Result<Self> {
        let lexicon: Lexicon = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()?;

        tracing::info!(
            path,
            stop_words = lexicon.stop_words.len(),
            synonyms = lexicon.synonyms.len(),
            domain_terms = lexicon.domain_terms.len(),
            "Loaded lexicon"
        );

        Ok(lexicon.normalized())
    }

    /// Normalize every entry so lookups match normalized tokens.
    ///
    /// Synonym values are left as written; they are normalized when a
    /// query expands them.
    pub fn normalized(self) -> Self {
        let fold = |set: HashSet<String>| -> HashSet<String> {
            set.iter()
                .map(|w| normalize(w))
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            stop_words: fold(self.stop_words),
            intent_words: fold(self.intent_words),
            synonyms: self
                .synonyms
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
            domain_terms: fold(self.domain_terms),
        }
    }

    /// True when a token should be dropped from a keyword list
    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token) && !self.intent_words.contains(token)
    }

    pub fn is_domain_term(&self, token: &str) -> bool {
        self.domain_terms.contains(token)
    }

    pub fn synonyms_for(&self, token: &str) -> Option<&[String]> {
        self.synonyms.get(token).map(Vec::as_slice)
    }
}
