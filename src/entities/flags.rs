/// Number of 32-bit words in a persisted flag set.
pub const FLAG_WORDS: usize = 4;

/// 128-bit flag vector stored as four words, matching the `Act`/`Aff`/`Pref` lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet([u32; FLAG_WORDS]);

impl FlagSet {
    pub const fn empty() -> Self {
        Self([0; FLAG_WORDS])
    }

    pub const fn from_words(words: [u32; FLAG_WORDS]) -> Self {
        Self(words)
    }

    pub fn words(&self) -> [u32; FLAG_WORDS] {
        self.0
    }

    pub fn has(&self, bit: usize) -> bool {
        let word = bit / 32;
        word < FLAG_WORDS && self.0[word] & (1 << (bit % 32)) != 0
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 32;
        if word < FLAG_WORDS {
            self.0[word] |= 1 << (bit % 32);
        }
    }

    pub fn clear(&mut self, bit: usize) {
        let word = bit / 32;
        if word < FLAG_WORDS {
            self.0[word] &= !(1 << (bit % 32));
        }
    }

    pub fn merge(&mut self, words: [u32; FLAG_WORDS]) {
        for (dst, src) in self.0.iter_mut().zip(words) {
            *dst |= src;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }
}

/// Player status bits carried in the `Act` flag set.
pub mod plr {
    pub const KILLER: usize = 0;
    pub const THIEF: usize = 1;
    pub const FROZEN: usize = 2;
    pub const WRITING: usize = 4;
    pub const CRASH: usize = 6;
    pub const SITEOK: usize = 7;
    pub const NOSHOUT: usize = 8;
    pub const NOTITLE: usize = 9;
    pub const DELETED: usize = 10;
    pub const LOADROOM: usize = 11;
    pub const NOWIZLIST: usize = 12;
    pub const NODELETE: usize = 13;
    pub const INVSTART: usize = 14;
    pub const CRYO: usize = 15;
}
