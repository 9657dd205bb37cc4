//! Content language detection and admission policy.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

use graphrag_common::{LanguageConfig, LanguageFilterMode};

/// Only the head of the document is sampled for detection.
const SAMPLE_CHARS: usize = 2000;
/// Below this, detection is too unreliable to act on.
const MIN_CHARS: usize = 50;
const CACHE_CAPACITY: usize = 1000;

pub struct LanguageGate {
    mode: LanguageFilterMode,
    allowed: HashSet<String>,
    /// Detection results keyed by digest of the sampled prefix.
    cache: Mutex<LruCache<[u8; 32], Option<String>>>,
}

impl LanguageGate {
    pub fn new(config: &LanguageConfig) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity");
        Self {
            mode: config.mode,
            allowed: config.allowed.iter().map(|l| l.to_lowercase()).collect(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.mode != LanguageFilterMode::Disabled
    }

    /// ISO 639-3 code of the detected language, or `None` when the sample is
    /// too short or detection fails.
    pub fn detect(&self, content: &str) -> Option<String> {
        let sample = sample(content);
        if sample.trim().chars().count() < MIN_CHARS {
            return None;
        }

        let key: [u8; 32] = Sha256::digest(sample.as_bytes()).into();
        {
            let mut cache = self.cache.lock().expect("language cache lock poisoned");
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let detected = whatlang::detect(sample).map(|info| info.lang().code().to_string());
        self.cache
            .lock()
            .expect("language cache lock poisoned")
            .put(key, detected.clone());
        detected
    }

    /// Admission per policy mode: `disabled` admits everything, `lenient`
    /// admits allow-listed and undetectable content, `strict` admits only
    /// allow-listed content.
    pub fn admit(&self, content: &str) -> bool {
        match self.mode {
            LanguageFilterMode::Disabled => true,
            LanguageFilterMode::Lenient => match self.detect(content) {
                Some(lang) => self.allowed.contains(&lang),
                None => true,
            },
            LanguageFilterMode::Strict => match self.detect(content) {
                Some(lang) => self.allowed.contains(&lang),
                None => false,
            },
        }
    }
}

fn sample(content: &str) -> &str {
    match content.char_indices().nth(SAMPLE_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}
