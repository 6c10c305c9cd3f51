use crate::entities::flags::FLAG_WORDS;

pub const MAX_AFFECT: usize = 32;
pub const MAX_DR_BYPASS: usize = 3;
pub const NUM_RESISTANCES: usize = 20;

/// Numeric apply codes used by effects and item applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyLocation {
    None,
    Str,
    Dex,
    Int,
    Wis,
    Con,
    Cha,
    Psp,
    Hit,
    Move,
    ArmorClass,
    Hitroll,
    Damroll,
    Save(usize),
    SpellRes,
    Size,
    Resistance(usize),
}

impl ApplyLocation {
    pub fn from_code(code: i32) -> Option<Self> {
        let location = match code {
            0 => ApplyLocation::None,
            1 => ApplyLocation::Str,
            2 => ApplyLocation::Dex,
            3 => ApplyLocation::Int,
            4 => ApplyLocation::Wis,
            5 => ApplyLocation::Con,
            6 => ApplyLocation::Cha,
            12 => ApplyLocation::Psp,
            13 => ApplyLocation::Hit,
            14 => ApplyLocation::Move,
            17 | 27 => ApplyLocation::ArmorClass,
            18 => ApplyLocation::Hitroll,
            19 => ApplyLocation::Damroll,
            20..=24 => ApplyLocation::Save((code - 20) as usize),
            25 => ApplyLocation::SpellRes,
            26 => ApplyLocation::Size,
            28..=47 => ApplyLocation::Resistance((code - 28) as usize),
            _ => return None,
        };
        Some(location)
    }

    pub fn code(self) -> i32 {
        match self {
            ApplyLocation::None => 0,
            ApplyLocation::Str => 1,
            ApplyLocation::Dex => 2,
            ApplyLocation::Int => 3,
            ApplyLocation::Wis => 4,
            ApplyLocation::Con => 5,
            ApplyLocation::Cha => 6,
            ApplyLocation::Psp => 12,
            ApplyLocation::Hit => 13,
            ApplyLocation::Move => 14,
            ApplyLocation::ArmorClass => 17,
            ApplyLocation::Hitroll => 18,
            ApplyLocation::Damroll => 19,
            ApplyLocation::Save(index) => 20 + index as i32,
            ApplyLocation::SpellRes => 25,
            ApplyLocation::Size => 26,
            ApplyLocation::Resistance(index) => 28 + index as i32,
        }
    }
}

/// Timed effect overlaying a record. `bonus_type` and `specific` are stacking
/// discriminators owned by game rules and carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveEffect {
    pub spell: i32,
    pub duration: i32,
    pub modifier: i32,
    pub location: i32,
    pub bitvector: [u32; FLAG_WORDS],
    pub bonus_type: i32,
    pub specific: i32,
}

impl ActiveEffect {
    pub fn new(spell: i32, duration: i32, location: ApplyLocation, modifier: i32) -> Self {
        Self {
            spell,
            duration,
            modifier,
            location: location.code(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageReduction {
    pub amount: i32,
    pub max_damage: i32,
    pub spell: i32,
    pub feat: i32,
    pub bypass: [(i32, i32); MAX_DR_BYPASS],
}

impl DamageReduction {
    /// Entries granted by a spell go away with the spell's effect.
    pub fn is_effect_linked(&self) -> bool {
        self.spell != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_codes_roundtrip_for_known_locations() {
        for code in [0, 1, 6, 12, 13, 14, 17, 18, 19, 20, 24, 25, 26, 28, 47] {
            let location = ApplyLocation::from_code(code).expect("known code");
            assert_eq!(location.code(), code);
        }
        assert_eq!(ApplyLocation::from_code(27), Some(ApplyLocation::ArmorClass));
        assert_eq!(ApplyLocation::from_code(99), None);
    }

    #[test]
    fn effect_constructor_stores_code() {
        let effect = ActiveEffect::new(42, 10, ApplyLocation::Str, 2);
        assert_eq!(effect.location, 1);
        assert_eq!(effect.bitvector, [0; FLAG_WORDS]);
    }
}
