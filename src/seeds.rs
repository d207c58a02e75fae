use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::wordlist::WORDS;

/// Seeds per standard run.
pub const STANDARD_SEED_COUNT: usize = 10;
/// Seeds per extended run, unlocked by a perfect standard score.
pub const EXTENDED_SEED_COUNT: usize = 100;

pub const LONG_STRING_LEN: usize = 15;

const LARGE_NUMBER_MIN: u64 = 1_000_000_000;
const LARGE_NUMBER_MAX: u64 = 9_999_999_999;
const ASCII_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Mixed into the seed so the number stream is independent of the text stream.
const NUMBER_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Which kind of token gets spliced into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SeedCategory {
    #[default]
    Word,
    LongString,
    Control,
    SmallNumber,
    LargeNumber,
}

impl SeedCategory {
    pub const ALL: [SeedCategory; 5] = [
        SeedCategory::Word,
        SeedCategory::LongString,
        SeedCategory::Control,
        SeedCategory::SmallNumber,
        SeedCategory::LargeNumber,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SeedCategory::Word => "Random Word",
            SeedCategory::LongString => "Random Strings",
            SeedCategory::Control => "Control (No Seed)",
            SeedCategory::SmallNumber => "Random Number (Small)",
            SeedCategory::LargeNumber => "Random Number (Large)",
        }
    }
}

impl fmt::Display for SeedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered seed tokens plus what produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSet {
    pub category: SeedCategory,
    pub seed: i64,
    pub tokens: Vec<String>,
}

impl SeedSet {
    pub fn len(&self) -> usize { self.tokens.len() }
    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }
    pub fn first(&self) -> Option<&str> { self.tokens.first().map(String::as_str) }
    pub fn iter(&self) -> impl Iterator<Item = &str> { self.tokens.iter().map(String::as_str) }
}

/// Explicit generator context. Both random sources are rebuilt from `seed`
/// on every `generate` call, so output depends only on the arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedGenerator {
    seed: i64,
}

impl SeedGenerator {
    pub fn new(seed: i64) -> Self { Self { seed } }

    pub fn seed(&self) -> i64 { self.seed }

    pub fn reseed(&mut self, seed: i64) { self.seed = seed; }

    pub fn generate(&self, category: SeedCategory, count: usize) -> SeedSet {
        let tokens = match category {
            SeedCategory::Word => {
                let mut rng = self.text_rng();
                (0..count).map(|_| WORDS[rng.random_range(0..WORDS.len())].to_string()).collect()
            }
            SeedCategory::LongString => {
                let mut rng = self.text_rng();
                (0..count).map(|_| random_letters(&mut rng, LONG_STRING_LEN)).collect()
            }
            SeedCategory::Control => vec![String::new(); count],
            SeedCategory::SmallNumber => (0..count).map(|n| n.to_string()).collect(),
            SeedCategory::LargeNumber => {
                let mut rng = self.number_rng();
                (0..count)
                    .map(|_| rng.random_range(LARGE_NUMBER_MIN..=LARGE_NUMBER_MAX).to_string())
                    .collect()
            }
        };
        SeedSet { category, seed: self.seed, tokens }
    }

    fn text_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed as u64)
    }

    fn number_rng(&self) -> StdRng {
        StdRng::seed_from_u64((self.seed as u64) ^ NUMBER_STREAM)
    }
}

fn random_letters(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| ASCII_LETTERS[rng.random_range(0..ASCII_LETTERS.len())] as char)
        .collect()
}

/// One-shot form of [`SeedGenerator::generate`].
pub fn generate(category: SeedCategory, seed: i64, count: usize) -> SeedSet {
    SeedGenerator::new(seed).generate(category, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_categories_are_reproducible() {
        for category in [SeedCategory::Word, SeedCategory::LongString, SeedCategory::LargeNumber] {
            for seed in [0, 42, -7, i64::MAX] {
                assert_eq!(generate(category, seed, 10), generate(category, seed, 10), "{category}");
            }
        }
    }

    #[test]
    fn small_numbers_ignore_seed() {
        let expected: Vec<String> = (0..10).map(|n| n.to_string()).collect();
        assert_eq!(generate(SeedCategory::SmallNumber, 42, 10).tokens, expected);
        assert_eq!(generate(SeedCategory::SmallNumber, 1234, 10).tokens, expected);
    }

    #[test]
    fn control_is_all_empty() {
        let set = generate(SeedCategory::Control, 99, 10);
        assert_eq!(set.len(), 10);
        assert!(set.iter().all(str::is_empty));
    }

    #[test]
    fn long_strings_are_fifteen_letters() {
        let set = generate(SeedCategory::LongString, 42, 25);
        assert_eq!(set.len(), 25);
        for tok in set.iter() {
            assert_eq!(tok.len(), LONG_STRING_LEN);
            assert!(tok.bytes().all(|b| b.is_ascii_alphabetic()), "{tok}");
        }
    }

    #[test]
    fn large_numbers_have_ten_digits() {
        let set = generate(SeedCategory::LargeNumber, 42, EXTENDED_SEED_COUNT);
        for tok in set.iter() {
            let n: u64 = tok.parse().unwrap();
            assert!((LARGE_NUMBER_MIN..=LARGE_NUMBER_MAX).contains(&n));
        }
    }

    #[test]
    fn words_come_from_word_list() {
        let set = generate(SeedCategory::Word, 42, 30);
        assert!(set.iter().all(|w| WORDS.contains(&w)));
    }

    #[test]
    fn different_seeds_give_different_words() {
        assert_ne!(generate(SeedCategory::Word, 1, 10), generate(SeedCategory::Word, 2, 10));
    }

    #[test]
    fn extended_set_starts_with_standard_set() {
        let small = generate(SeedCategory::LargeNumber, 42, STANDARD_SEED_COUNT);
        let big = generate(SeedCategory::LargeNumber, 42, EXTENDED_SEED_COUNT);
        assert_eq!(&big.tokens[..STANDARD_SEED_COUNT], &small.tokens[..]);
    }

    #[test]
    fn zero_count_is_empty() {
        for category in SeedCategory::ALL {
            assert!(generate(category, 42, 0).is_empty());
        }
    }

    #[test]
    fn reseed_changes_output() {
        let mut gen = SeedGenerator::new(1);
        let before = gen.generate(SeedCategory::LongString, 5);
        gen.reseed(2);
        assert_eq!(gen.seed(), 2);
        assert_ne!(gen.generate(SeedCategory::LongString, 5), before);
        gen.reseed(1);
        assert_eq!(gen.generate(SeedCategory::LongString, 5), before);
    }
}
