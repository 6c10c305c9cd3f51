use crate::entities::effects::{ActiveEffect, DamageReduction, MAX_AFFECT};
use crate::entities::equipment::{EquippedItem, Equipment, WearSlot};
use crate::entities::flags::FlagSet;
use crate::entities::stats::{AbilityScores, DerivedStats, Points, Pools};
use crate::entities::tables::{KeyOutOfRange, SparseTable};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MAX_CLASSES: i32 = 30;
pub const MAX_SKILLS: i32 = 600;
pub const MAX_ABILITIES: i32 = 200;
pub const NUM_FEATS: i32 = 1000;
pub const NUM_EVOLUTIONS: i32 = 200;
pub const MAX_SPELLS: i32 = 400;
pub const MAX_WARDING: i32 = 10;
pub const MAX_ENEMIES: i32 = 10;
pub const NUM_LANGUAGES: i32 = 40;
pub const NUM_ALC_DISCOVERIES: i32 = 44;
pub const MAX_SAVED_EVENTS: i32 = 100;
pub const NUM_CASTERS: usize = 7;
pub const MAX_MEM: usize = 200;
pub const NUM_CIRCLES: i32 = 10;
pub const NUM_CONDITIONS: usize = 3;
pub const MAX_CURRENT_QUESTS: usize = 3;
pub const MAX_COMPLETED_QUESTS: usize = 1024;
pub const MAX_BUFFS: usize = 6;
pub const MAX_BOMBS_ALLOWED: usize = 20;
pub const NUM_PALADIN_MERCIES: usize = 20;
pub const NUM_BLACKGUARD_CRUELTIES: usize = 20;
pub const NUM_INQ_JUDGEMENTS: usize = 10;
/// Skill focus columns: regular and epic.
pub const NUM_SKFEATS: usize = 2;
pub const NUM_CFEATS: usize = 12;
pub const NUM_SFEATS: usize = 9;

pub mod class {
    pub const WIZARD: i32 = 0;
    pub const CLERIC: i32 = 1;
    pub const ROGUE: i32 = 2;
    pub const WARRIOR: i32 = 3;
    pub const MONK: i32 = 4;
    pub const DRUID: i32 = 5;
    pub const BERSERKER: i32 = 6;
    pub const SORCERER: i32 = 7;
    pub const PALADIN: i32 = 8;
    pub const RANGER: i32 = 9;
    pub const BARD: i32 = 10;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error(transparent)]
    KeyOutOfRange(#[from] KeyOutOfRange),
    #[error("class levels would total {total}, above level {level}")]
    ClassLevelsExceedLevel { total: i64, level: i32 },
    #[error("effect list full ({} entries)", MAX_AFFECT)]
    EffectsFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub alias: String,
    pub replacement: String,
    pub kind: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedSpell {
    pub class: i32,
    pub spell: i32,
    pub metamagic: i32,
    pub prep_time: i32,
}

/// Entry of the spell collection or the innate magic queue. Innate magic
/// slots hold a spell circle in `spell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellSlot {
    pub class: i32,
    pub spell: i32,
    pub metamagic: i32,
    pub prep_time: i32,
    pub domain: i32,
}

/// One player's full persistent state plus the attached state (effects,
/// equipment) that overlays it while playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub account: String,
    pub title: String,
    pub description: String,
    pub background: String,
    pub poofin: String,
    pub poofout: String,
    pub host: String,
    pub birth: i64,
    pub played: i64,
    pub last_logon: i64,

    pub sex: i32,
    pub class: i32,
    pub race: i32,
    pub size: i32,
    pub level: i32,
    pub height: i32,
    pub weight: i32,
    pub alignment: i32,
    pub deity: i32,
    pub premade_build: i32,
    pub preferred_arcane: i32,
    pub preferred_divine: i32,
    pub morphed: i32,
    pub wimp_level: i32,
    pub freeze_level: i32,
    pub invis_level: i32,
    pub load_room: i32,
    pub bad_passwords: i32,
    pub practices: i32,
    pub trains: i32,
    pub boosts: i32,
    pub feat_points: i32,
    pub epic_feat_points: i32,
    pub conditions: [i32; NUM_CONDITIONS],
    pub abilities: AbilityScores,
    pub pools: Pools,
    pub points: Points,
    pub gold: i64,
    pub bank_gold: i64,
    pub exp: i64,
    pub olc_zone: i32,
    pub page_length: i32,
    pub screen_width: i32,
    pub quest_points: i32,
    pub quest_counters: [i32; MAX_CURRENT_QUESTS],
    pub current_quests: [i32; MAX_CURRENT_QUESTS],
    pub clan: i32,
    pub clan_rank: i32,
    pub clan_points: i32,
    pub diplomacy_timer: i32,
    pub speaking: i32,
    pub coords: [i32; 2],
    pub script_triggers: Vec<i32>,
    pub act_flags: FlagSet,
    pub aff_flags: FlagSet,
    pub pref_flags: FlagSet,

    pub class_levels: SparseTable,
    pub class_feat_points: SparseTable,
    pub epic_class_feat_points: SparseTable,
    pub skills: SparseTable,
    pub ability_ranks: SparseTable,
    pub feats: SparseTable,
    pub evolutions: SparseTable,
    pub known_evolutions: SparseTable,
    pub warding: SparseTable,
    pub favored_enemies: SparseTable,
    pub special_abilities: SparseTable,
    pub discoveries: SparseTable,
    pub languages: SparseTable,
    pub events: SparseTable,
    pub potions: SparseTable,
    pub scrolls: SparseTable,
    pub wands: SparseTable,
    pub staves: SparseTable,
    pub known_spells: BTreeSet<(i32, i32)>,
    pub prep_queue: Vec<PreparedSpell>,
    pub innate_magic: Vec<SpellSlot>,
    pub spell_collection: Vec<SpellSlot>,
    pub prep_timers: Vec<[i32; NUM_CASTERS]>,
    pub praying: Vec<[i32; NUM_CASTERS]>,
    pub praying_metamagic: Vec<[i32; NUM_CASTERS]>,
    pub prayed: Vec<[i32; NUM_CASTERS]>,
    pub prayed_metamagic: Vec<[i32; NUM_CASTERS]>,
    /// Per-ability `[feat, epic]` focus ranks.
    pub skill_focus: Vec<[i32; NUM_SKFEATS]>,
    /// Self-buff slots: `[spell, ready]`.
    pub buffs: Vec<[i32; 2]>,
    pub bombs: Vec<i32>,
    pub mercies: Vec<i32>,
    pub cruelties: Vec<i32>,
    pub judgements: Vec<i32>,
    pub combat_feats: Vec<FlagSet>,
    pub school_feats: Vec<FlagSet>,
    pub completed_quests: Vec<i32>,
    pub aliases: Vec<Alias>,
    pub damage_reduction: Vec<DamageReduction>,

    effects: Vec<ActiveEffect>,
    equipment: Equipment,
    derived: DerivedStats,

    pub is_npc: bool,
    pub transforming: bool,
}

impl PlayerRecord {
    /// Zeroed record with every table bounded. Static defaults are applied
    /// on top of this by the persistence layer.
    pub fn blank() -> Self {
        Self {
            id: 0,
            name: String::new(),
            password: String::new(),
            account: String::new(),
            title: String::new(),
            description: String::new(),
            background: String::new(),
            poofin: String::new(),
            poofout: String::new(),
            host: String::new(),
            birth: 0,
            played: 0,
            last_logon: 0,
            sex: 0,
            class: 0,
            race: 0,
            size: 0,
            level: 0,
            height: 0,
            weight: 0,
            alignment: 0,
            deity: 0,
            premade_build: 0,
            preferred_arcane: 0,
            preferred_divine: 0,
            morphed: 0,
            wimp_level: 0,
            freeze_level: 0,
            invis_level: 0,
            load_room: 0,
            bad_passwords: 0,
            practices: 0,
            trains: 0,
            boosts: 0,
            feat_points: 0,
            epic_feat_points: 0,
            conditions: [0; NUM_CONDITIONS],
            abilities: AbilityScores::default(),
            pools: Pools::default(),
            points: Points::default(),
            gold: 0,
            bank_gold: 0,
            exp: 0,
            olc_zone: 0,
            page_length: 0,
            screen_width: 0,
            quest_points: 0,
            quest_counters: [0; MAX_CURRENT_QUESTS],
            current_quests: [0; MAX_CURRENT_QUESTS],
            clan: 0,
            clan_rank: 0,
            clan_points: 0,
            diplomacy_timer: 0,
            speaking: 0,
            coords: [0; 2],
            script_triggers: Vec::new(),
            act_flags: FlagSet::empty(),
            aff_flags: FlagSet::empty(),
            pref_flags: FlagSet::empty(),
            class_levels: SparseTable::new(0, MAX_CLASSES - 1),
            class_feat_points: SparseTable::new(0, MAX_CLASSES - 1),
            epic_class_feat_points: SparseTable::new(0, MAX_CLASSES - 1),
            skills: SparseTable::new(1, MAX_SKILLS - 1),
            ability_ranks: SparseTable::new(1, MAX_ABILITIES),
            feats: SparseTable::new(1, NUM_FEATS - 1),
            evolutions: SparseTable::new(1, NUM_EVOLUTIONS - 1),
            known_evolutions: SparseTable::new(1, NUM_EVOLUTIONS - 1),
            warding: SparseTable::new(0, MAX_WARDING - 1),
            favored_enemies: SparseTable::new(0, MAX_ENEMIES - 1),
            special_abilities: SparseTable::new(0, MAX_CLASSES - 1),
            discoveries: SparseTable::new(0, NUM_ALC_DISCOVERIES - 1),
            languages: SparseTable::new(0, NUM_LANGUAGES - 1),
            events: SparseTable::new(0, MAX_SAVED_EVENTS - 1),
            potions: SparseTable::new(1, MAX_SPELLS - 1),
            scrolls: SparseTable::new(1, MAX_SPELLS - 1),
            wands: SparseTable::new(1, MAX_SPELLS - 1),
            staves: SparseTable::new(1, MAX_SPELLS - 1),
            known_spells: BTreeSet::new(),
            prep_queue: Vec::new(),
            innate_magic: Vec::new(),
            spell_collection: Vec::new(),
            prep_timers: vec![[0; NUM_CASTERS]; MAX_MEM],
            praying: vec![[0; NUM_CASTERS]; MAX_MEM],
            praying_metamagic: vec![[0; NUM_CASTERS]; MAX_MEM],
            prayed: vec![[0; NUM_CASTERS]; MAX_MEM],
            prayed_metamagic: vec![[0; NUM_CASTERS]; MAX_MEM],
            skill_focus: vec![[0; NUM_SKFEATS]; MAX_ABILITIES as usize + 1],
            buffs: vec![[0; 2]; MAX_BUFFS],
            bombs: vec![0; MAX_BOMBS_ALLOWED],
            mercies: vec![0; NUM_PALADIN_MERCIES],
            cruelties: vec![0; NUM_BLACKGUARD_CRUELTIES],
            judgements: vec![0; NUM_INQ_JUDGEMENTS],
            combat_feats: vec![FlagSet::empty(); NUM_CFEATS],
            school_feats: vec![FlagSet::empty(); NUM_SFEATS],
            completed_quests: Vec::new(),
            aliases: Vec::new(),
            damage_reduction: Vec::new(),
            effects: Vec::new(),
            equipment: Equipment::default(),
            derived: DerivedStats::default(),
            is_npc: false,
            transforming: false,
        }
    }

    pub fn class_level_total(&self) -> i64 {
        self.class_levels
            .iter()
            .map(|(_, level)| i64::from(level))
            .sum()
    }

    /// Sets one class's level, keeping the class-level sum within `level`.
    pub fn set_class_level(&mut self, class: i32, level: i32) -> Result<(), RecordError> {
        let total =
            self.class_level_total() - i64::from(self.class_levels.get(class)) + i64::from(level);
        if total > i64::from(self.level) {
            return Err(RecordError::ClassLevelsExceedLevel {
                total,
                level: self.level,
            });
        }
        self.class_levels.set(class, level)?;
        Ok(())
    }

    pub fn effects(&self) -> &[ActiveEffect] {
        &self.effects
    }

    pub fn add_effect(&mut self, effect: ActiveEffect) -> Result<(), RecordError> {
        if self.effects.len() >= MAX_AFFECT {
            return Err(RecordError::EffectsFull);
        }
        self.effects.push(effect);
        self.recompute_derived();
        Ok(())
    }

    pub fn remove_effect(&mut self, index: usize) -> Option<ActiveEffect> {
        if index >= self.effects.len() {
            return None;
        }
        let effect = self.effects.remove(index);
        self.recompute_derived();
        Some(effect)
    }

    pub fn equipment(&self) -> &Equipment {
        &self.equipment
    }

    pub fn equip(&mut self, slot: WearSlot, item: EquippedItem) -> Option<EquippedItem> {
        let previous = self.equipment.set_slot(slot, Some(item));
        self.recompute_derived();
        previous
    }

    pub fn unequip(&mut self, slot: WearSlot) -> Option<EquippedItem> {
        let item = self.equipment.take_slot(slot);
        if item.is_some() {
            self.recompute_derived();
        }
        item
    }

    pub fn derived(&self) -> &DerivedStats {
        &self.derived
    }

    /// Rebuilds derived stats from base values, worn item applies and effects.
    pub fn recompute_derived(&mut self) {
        let mut derived = DerivedStats::from_base(
            &self.abilities,
            &self.pools,
            &self.points,
            self.size,
            &self.aff_flags,
        );
        for (_, item) in self.equipment.iter() {
            for (location, modifier) in &item.applies {
                derived.apply(*location, *modifier);
            }
        }
        for effect in &self.effects {
            derived.apply(effect.location, effect.modifier);
            derived.aff_flags.merge(effect.bitvector);
        }
        self.derived = derived;
    }

    pub(crate) fn detach_effects(&mut self) -> Vec<ActiveEffect> {
        let effects = std::mem::take(&mut self.effects);
        self.recompute_derived();
        effects
    }

    pub(crate) fn attach_effects(&mut self, effects: Vec<ActiveEffect>) {
        self.effects = effects;
        self.recompute_derived();
    }
}
