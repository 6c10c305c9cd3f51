use crate::entities::effects::{ApplyLocation, NUM_RESISTANCES};
use crate::entities::flags::FlagSet;

pub const NUM_SAVES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbilityScores {
    pub str: i32,
    pub str_add: i32,
    pub int: i32,
    pub wis: i32,
    pub dex: i32,
    pub con: i32,
    pub cha: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pools {
    pub hit: i32,
    pub max_hit: i32,
    pub psp: i32,
    pub max_psp: i32,
    pub moves: i32,
    pub max_moves: i32,
}

/// Persisted combat numbers before any item or effect bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Points {
    pub armor_class: i32,
    pub hitroll: i32,
    pub damroll: i32,
    pub spell_res: i32,
    pub saves: [i32; NUM_SAVES],
    pub resistances: [i32; NUM_RESISTANCES],
}

/// Values seen by game rules: base plus equipment applies plus effect modifiers.
/// Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedStats {
    pub abilities: AbilityScores,
    pub max_hit: i32,
    pub max_psp: i32,
    pub max_moves: i32,
    pub size: i32,
    pub points: Points,
    pub aff_flags: FlagSet,
}

impl DerivedStats {
    pub fn from_base(
        abilities: &AbilityScores,
        pools: &Pools,
        points: &Points,
        size: i32,
        aff_flags: &FlagSet,
    ) -> Self {
        Self {
            abilities: *abilities,
            max_hit: pools.max_hit,
            max_psp: pools.max_psp,
            max_moves: pools.max_moves,
            size,
            points: *points,
            aff_flags: *aff_flags,
        }
    }

    /// Adds one modifier at a numeric apply code, saturating at the `i32`
    /// bounds. Codes with no stat behind them are ignored.
    pub fn apply(&mut self, location: i32, modifier: i32) {
        let Some(location) = ApplyLocation::from_code(location) else {
            return;
        };
        let stat = match location {
            ApplyLocation::None => return,
            ApplyLocation::Str => &mut self.abilities.str,
            ApplyLocation::Dex => &mut self.abilities.dex,
            ApplyLocation::Int => &mut self.abilities.int,
            ApplyLocation::Wis => &mut self.abilities.wis,
            ApplyLocation::Con => &mut self.abilities.con,
            ApplyLocation::Cha => &mut self.abilities.cha,
            ApplyLocation::Psp => &mut self.max_psp,
            ApplyLocation::Hit => &mut self.max_hit,
            ApplyLocation::Move => &mut self.max_moves,
            ApplyLocation::ArmorClass => &mut self.points.armor_class,
            ApplyLocation::Hitroll => &mut self.points.hitroll,
            ApplyLocation::Damroll => &mut self.points.damroll,
            ApplyLocation::Save(index) => &mut self.points.saves[index],
            ApplyLocation::SpellRes => &mut self.points.spell_res,
            ApplyLocation::Size => &mut self.size,
            ApplyLocation::Resistance(index) => &mut self.points.resistances[index],
        };
        *stat = stat.saturating_add(modifier);
    }
}
