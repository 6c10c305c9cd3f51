//! Per-field defaults and accessors for every scalar line of a record.
//!
//! Each entry ties a tag to its default, its value shape and the record
//! field behind it. The writer walks this list to emit non-default fields;
//! the reader builds its scalar handlers from it and seeds new records with
//! the defaults before parsing.

use crate::entities::effects::NUM_RESISTANCES;
use crate::entities::flags::FlagSet;
use crate::entities::player::PlayerRecord;
use crate::entities::stats::NUM_SAVES;
use crate::persistence::tag::Tag;
use std::sync::OnceLock;

pub const PFDEF_SIZE: i32 = -1;
pub const PFDEF_PREFERRED_CLASS: i32 = -1;
pub const PFDEF_OLC: i32 = -1;
pub const PFDEF_PAGELENGTH: i32 = 40;
pub const PFDEF_SCREENWIDTH: i32 = 80;
pub const PFDEF_CURRQUEST: i32 = -1;
pub const PFDEF_PREMADE_BUILD: i32 = -1;

const SAVE_TAGS: [&str; NUM_SAVES] = ["Thr1", "Thr2", "Thr3", "Thr4", "Thr5"];
const RESISTANCE_TAGS: [&str; NUM_RESISTANCES] = [
    "Res1", "Res2", "Res3", "Res4", "Res5", "Res6", "Res7", "Res8", "Res9", "ResA", "ResB",
    "ResC", "ResD", "ResE", "ResF", "ResG", "ResH", "ResI", "ResJ", "ResK",
];
const CONDITION_TAGS: [&str; 3] = ["Hung", "Thir", "Drnk"];
const QUEST_COUNTER_TAGS: [&str; 3] = ["Qcnt", "Qcn1", "Qcn2"];
const CURRENT_QUEST_TAGS: [&str; 3] = ["Qcur", "Qcu1", "Qcu2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    IfNotDefault,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Int(i64),
    Pair(i64, i64),
    Flags(FlagSet),
    Empty,
}

type GetInt = Box<dyn Fn(&PlayerRecord) -> i64 + Send + Sync>;
type SetInt = Box<dyn Fn(&mut PlayerRecord, i64) -> bool + Send + Sync>;

pub enum FieldKind {
    Int {
        get: GetInt,
        set: SetInt,
    },
    Pair {
        get: fn(&PlayerRecord) -> (i64, i64),
        set: fn(&mut PlayerRecord, i64, i64) -> bool,
    },
    Flags {
        get: fn(&PlayerRecord) -> FlagSet,
        set: fn(&mut PlayerRecord, FlagSet),
    },
    Text {
        get: fn(&PlayerRecord) -> &str,
        set: fn(&mut PlayerRecord, String),
    },
    Block {
        get: fn(&PlayerRecord) -> &str,
        set: fn(&mut PlayerRecord, String),
    },
    /// One line per element, the tag repeated.
    IntList {
        get: fn(&PlayerRecord) -> &[i32],
        push: fn(&mut PlayerRecord, i32),
    },
    /// `index word..` lines, the tag repeated for every non-empty row.
    /// `words` flag words are written per row.
    FlagRows {
        words: usize,
        get: fn(&PlayerRecord) -> &[FlagSet],
        rows_mut: fn(&mut PlayerRecord) -> &mut [FlagSet],
    },
}

pub struct FieldSpec {
    pub tag: Tag,
    pub emit: Emit,
    pub default: FieldDefault,
    pub kind: FieldKind,
}

impl FieldSpec {
    fn always(mut self) -> Self {
        self.emit = Emit::Always;
        self
    }

    pub fn is_default(&self, record: &PlayerRecord) -> bool {
        match (&self.kind, self.default) {
            (FieldKind::Int { get, .. }, FieldDefault::Int(default)) => get(record) == default,
            (FieldKind::Pair { get, .. }, FieldDefault::Pair(first, second)) => {
                get(record) == (first, second)
            }
            (FieldKind::Flags { get, .. }, FieldDefault::Flags(default)) => get(record) == default,
            (FieldKind::Text { get, .. }, _) | (FieldKind::Block { get, .. }, _) => {
                get(record).is_empty()
            }
            (FieldKind::IntList { get, .. }, _) => get(record).is_empty(),
            (FieldKind::FlagRows { get, .. }, _) => get(record).iter().all(FlagSet::is_empty),
            _ => false,
        }
    }

    pub fn apply_default(&self, record: &mut PlayerRecord) {
        match (&self.kind, self.default) {
            (FieldKind::Int { set, .. }, FieldDefault::Int(default)) => {
                set(record, default);
            }
            (FieldKind::Pair { set, .. }, FieldDefault::Pair(first, second)) => {
                set(record, first, second);
            }
            (FieldKind::Flags { set, .. }, FieldDefault::Flags(default)) => set(record, default),
            (FieldKind::Text { set, .. }, _) | (FieldKind::Block { set, .. }, _) => {
                set(record, String::new())
            }
            _ => {}
        }
    }
}

fn int32<G, S>(tag: &str, default: i32, get: G, set: S) -> FieldSpec
where
    G: Fn(&PlayerRecord) -> i32 + Send + Sync + 'static,
    S: Fn(&mut PlayerRecord, i32) + Send + Sync + 'static,
{
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Int(default.into()),
        kind: FieldKind::Int {
            get: Box::new(move |record: &PlayerRecord| i64::from(get(record))),
            set: Box::new(move |record: &mut PlayerRecord, value: i64| match i32::try_from(value) {
                Ok(value) => {
                    set(record, value);
                    true
                }
                Err(_) => false,
            }),
        },
    }
}

fn int64<G, S>(tag: &str, get: G, set: S) -> FieldSpec
where
    G: Fn(&PlayerRecord) -> i64 + Send + Sync + 'static,
    S: Fn(&mut PlayerRecord, i64) + Send + Sync + 'static,
{
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Int(0),
        kind: FieldKind::Int {
            get: Box::new(get),
            set: Box::new(move |record: &mut PlayerRecord, value: i64| {
                set(record, value);
                true
            }),
        },
    }
}

fn pair(
    tag: &str,
    get: fn(&PlayerRecord) -> (i64, i64),
    set: fn(&mut PlayerRecord, i64, i64) -> bool,
) -> FieldSpec {
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Pair(0, 0),
        kind: FieldKind::Pair { get, set },
    }
}

fn flags(
    tag: &str,
    get: fn(&PlayerRecord) -> FlagSet,
    set: fn(&mut PlayerRecord, FlagSet),
) -> FieldSpec {
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Flags(FlagSet::empty()),
        kind: FieldKind::Flags { get, set },
    }
}

fn flag_rows(
    tag: &str,
    words: usize,
    get: fn(&PlayerRecord) -> &[FlagSet],
    rows_mut: fn(&mut PlayerRecord) -> &mut [FlagSet],
) -> FieldSpec {
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Empty,
        kind: FieldKind::FlagRows {
            words,
            get,
            rows_mut,
        },
    }
}

fn text(
    tag: &str,
    get: fn(&PlayerRecord) -> &str,
    set: fn(&mut PlayerRecord, String),
) -> FieldSpec {
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Empty,
        kind: FieldKind::Text { get, set },
    }
}

fn block(
    tag: &str,
    get: fn(&PlayerRecord) -> &str,
    set: fn(&mut PlayerRecord, String),
) -> FieldSpec {
    FieldSpec {
        tag: Tag::new(tag),
        emit: Emit::IfNotDefault,
        default: FieldDefault::Empty,
        kind: FieldKind::Block { get, set },
    }
}

fn set_pair(first: &mut i32, second: &mut i32, a: i64, b: i64) -> bool {
    match (i32::try_from(a), i32::try_from(b)) {
        (Ok(a), Ok(b)) => {
            *first = a;
            *second = b;
            true
        }
        _ => false,
    }
}

fn build_fields() -> Vec<FieldSpec> {
    let mut fields = vec![
        text("Name", |r| r.name.as_str(), |r, v| r.name = v),
        text("Pass", |r| r.password.as_str(), |r, v| r.password = v),
        text("Acct", |r| r.account.as_str(), |r, v| r.account = v),
        text("Titl", |r| r.title.as_str(), |r, v| r.title = v),
        block("Desc", |r| r.description.as_str(), |r, v| r.description = v),
        block("BGrd", |r| r.background.as_str(), |r, v| r.background = v),
        text("PfIn", |r| r.poofin.as_str(), |r, v| r.poofin = v),
        text("PfOt", |r| r.poofout.as_str(), |r, v| r.poofout = v),
        int32("Sex ", 0, |r| r.sex, |r, v| r.sex = v),
        int32("Clas", 0, |r| r.class, |r, v| r.class = v),
        int32("Race", 0, |r| r.race, |r, v| r.race = v),
        int32("Size", PFDEF_SIZE, |r| r.size, |r, v| r.size = v),
        int32("Levl", 0, |r| r.level, |r, v| r.level = v),
        int64("Id  ", |r| r.id, |r, v| r.id = v).always(),
        int64("Brth", |r| r.birth, |r, v| r.birth = v).always(),
        int64("Plyd", |r| r.played, |r, v| r.played = v).always(),
        int64("Last", |r| r.last_logon, |r, v| r.last_logon = v).always(),
        int32("Spek", 0, |r| r.speaking, |r, v| r.speaking = v),
        text("Host", |r| r.host.as_str(), |r, v| r.host = v),
        int32("Hite", 0, |r| r.height, |r, v| r.height = v),
        int32("Wate", 0, |r| r.weight, |r, v| r.weight = v),
        int32("Alin", 0, |r| r.alignment, |r, v| r.alignment = v),
        flags("Act ", |r| r.act_flags, |r, v| r.act_flags = v),
        flags("Aff ", |r| r.aff_flags, |r, v| r.aff_flags = v),
        flags("Pref", |r| r.pref_flags, |r, v| r.pref_flags = v),
    ];
    for (idx, tag) in SAVE_TAGS.iter().enumerate() {
        fields.push(int32(
            tag,
            0,
            move |r| r.points.saves[idx],
            move |r, v| r.points.saves[idx] = v,
        ));
    }
    for (idx, tag) in RESISTANCE_TAGS.iter().enumerate() {
        fields.push(int32(
            tag,
            0,
            move |r| r.points.resistances[idx],
            move |r, v| r.points.resistances[idx] = v,
        ));
    }
    fields.extend([
        int32("Wimp", 0, |r| r.wimp_level, |r, v| r.wimp_level = v),
        int32("Frez", 0, |r| r.freeze_level, |r, v| r.freeze_level = v),
        int32("Invs", 0, |r| r.invis_level, |r, v| r.invis_level = v),
        int32("Room", 0, |r| r.load_room, |r, v| r.load_room = v),
        int32("Badp", 0, |r| r.bad_passwords, |r, v| r.bad_passwords = v),
        int32("Lern", 0, |r| r.practices, |r, v| r.practices = v),
        int32("Trns", 0, |r| r.trains, |r, v| r.trains = v),
        int32("Bost", 0, |r| r.boosts, |r, v| r.boosts = v),
        int32(
            "PCAr",
            PFDEF_PREFERRED_CLASS,
            |r| r.preferred_arcane,
            |r, v| r.preferred_arcane = v,
        ),
        int32(
            "PCDi",
            PFDEF_PREFERRED_CLASS,
            |r| r.preferred_divine,
            |r, v| r.preferred_divine = v,
        ),
        int32("Ftpt", 0, |r| r.feat_points, |r, v| r.feat_points = v),
        int32("Efpt", 0, |r| r.epic_feat_points, |r, v| r.epic_feat_points = v),
    ]);
    for (idx, tag) in CONDITION_TAGS.iter().enumerate() {
        fields.push(int32(
            tag,
            0,
            move |r| r.conditions[idx],
            move |r, v| r.conditions[idx] = v,
        ));
    }
    fields.extend([
        pair(
            "Hit ",
            |r| (r.pools.hit.into(), r.pools.max_hit.into()),
            |r, a, b| set_pair(&mut r.pools.hit, &mut r.pools.max_hit, a, b),
        ),
        pair(
            "PSP ",
            |r| (r.pools.psp.into(), r.pools.max_psp.into()),
            |r, a, b| set_pair(&mut r.pools.psp, &mut r.pools.max_psp, a, b),
        ),
        pair(
            "Move",
            |r| (r.pools.moves.into(), r.pools.max_moves.into()),
            |r, a, b| set_pair(&mut r.pools.moves, &mut r.pools.max_moves, a, b),
        ),
        pair(
            "Str ",
            |r| (r.abilities.str.into(), r.abilities.str_add.into()),
            |r, a, b| set_pair(&mut r.abilities.str, &mut r.abilities.str_add, a, b),
        ),
        int32("Int ", 0, |r| r.abilities.int, |r, v| r.abilities.int = v),
        int32("Wis ", 0, |r| r.abilities.wis, |r, v| r.abilities.wis = v),
        int32("Dex ", 0, |r| r.abilities.dex, |r, v| r.abilities.dex = v),
        int32("Con ", 0, |r| r.abilities.con, |r, v| r.abilities.con = v),
        int32("Cha ", 0, |r| r.abilities.cha, |r, v| r.abilities.cha = v),
        int32("Ac  ", 0, |r| r.points.armor_class, |r, v| r.points.armor_class = v),
        int64("Gold", |r| r.gold, |r, v| r.gold = v),
        int64("Bank", |r| r.bank_gold, |r, v| r.bank_gold = v),
        int64("Exp ", |r| r.exp, |r, v| r.exp = v),
        int32("Hrol", 0, |r| r.points.hitroll, |r, v| r.points.hitroll = v),
        int32("Drol", 0, |r| r.points.damroll, |r, v| r.points.damroll = v),
        int32("SpRs", 0, |r| r.points.spell_res, |r, v| r.points.spell_res = v),
        int32("Mrph", 0, |r| r.morphed, |r, v| r.morphed = v),
        int32("God ", 0, |r| r.deity, |r, v| r.deity = v),
        int32("Olc ", PFDEF_OLC, |r| r.olc_zone, |r, v| r.olc_zone = v),
        int32("Page", PFDEF_PAGELENGTH, |r| r.page_length, |r, v| r.page_length = v),
        int32("ScrW", PFDEF_SCREENWIDTH, |r| r.screen_width, |r, v| r.screen_width = v),
        int32("Qstp", 0, |r| r.quest_points, |r, v| r.quest_points = v),
    ]);
    for (idx, tag) in QUEST_COUNTER_TAGS.iter().enumerate() {
        fields.push(int32(
            tag,
            0,
            move |r| r.quest_counters[idx],
            move |r, v| r.quest_counters[idx] = v,
        ));
    }
    for (idx, tag) in CURRENT_QUEST_TAGS.iter().enumerate() {
        fields.push(int32(
            tag,
            PFDEF_CURRQUEST,
            move |r| r.current_quests[idx],
            move |r, v| r.current_quests[idx] = v,
        ));
    }
    fields.extend([
        int32("DipT", 0, |r| r.diplomacy_timer, |r, v| r.diplomacy_timer = v),
        int32("Cln ", 0, |r| r.clan, |r, v| r.clan = v),
        int32("Clrk", 0, |r| r.clan_rank, |r, v| r.clan_rank = v),
        int32("CPts", 0, |r| r.clan_points, |r, v| r.clan_points = v),
        FieldSpec {
            tag: Tag::new("Trig"),
            emit: Emit::IfNotDefault,
            default: FieldDefault::Empty,
            kind: FieldKind::IntList {
                get: |r| r.script_triggers.as_slice(),
                push: |r, v| r.script_triggers.push(v),
            },
        },
        flag_rows("CbFt", 4, |r| &r.combat_feats, |r| &mut r.combat_feats),
        flag_rows("SclF", 1, |r| &r.school_feats, |r| &mut r.school_feats),
        int32(
            "PreB",
            PFDEF_PREMADE_BUILD,
            |r| r.premade_build,
            |r, v| r.premade_build = v,
        ),
    ]);
    fields
}

static FIELDS: OnceLock<Vec<FieldSpec>> = OnceLock::new();

/// Every scalar field in file order.
pub fn fields() -> &'static [FieldSpec] {
    FIELDS.get_or_init(build_fields)
}

pub fn field(tag: Tag) -> Option<&'static FieldSpec> {
    fields().iter().find(|spec| spec.tag == tag)
}

pub fn default_of(tag: Tag) -> Option<FieldDefault> {
    field(tag).map(|spec| spec.default)
}

/// Puts every field back to its default and clears runtime-only state.
pub fn seed_defaults(record: &mut PlayerRecord) {
    *record = PlayerRecord::blank();
    for spec in fields() {
        spec.apply_default(record);
    }
    record.recompute_derived();
}

/// Fresh record for a new character, every field at its default.
pub fn new_record(name: &str) -> PlayerRecord {
    let mut record = PlayerRecord::blank();
    seed_defaults(&mut record);
    record.name = name.to_string();
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<Tag> = fields().iter().map(|spec| spec.tag).collect();
        let total = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), total);
    }

    #[test]
    fn non_zero_defaults() {
        assert_eq!(default_of(Tag::new("Size")), Some(FieldDefault::Int(-1)));
        assert_eq!(default_of(Tag::new("Page")), Some(FieldDefault::Int(40)));
        assert_eq!(default_of(Tag::new("ScrW")), Some(FieldDefault::Int(80)));
        assert_eq!(default_of(Tag::new("Qcu2")), Some(FieldDefault::Int(-1)));
        assert_eq!(default_of(Tag::new("Hit ")), Some(FieldDefault::Pair(0, 0)));
        assert_eq!(default_of(Tag::new("Desc")), Some(FieldDefault::Empty));
        assert_eq!(default_of(Tag::new("ZZZZ")), None);
    }

    #[test]
    fn seeded_record_is_all_default() {
        let record = new_record("Aldric");
        assert_eq!(record.size, PFDEF_SIZE);
        assert_eq!(record.olc_zone, PFDEF_OLC);
        assert_eq!(record.current_quests, [PFDEF_CURRQUEST; 3]);
        for spec in fields() {
            if spec.tag == Tag::new("Name") {
                continue;
            }
            assert!(spec.is_default(&record), "{} not default", spec.tag);
        }
    }

    #[test]
    fn seeding_clears_runtime_state() {
        let mut record = new_record("Aldric");
        record.level = 12;
        record.transforming = true;
        record.skills.set(5, 40).expect("in range");
        seed_defaults(&mut record);
        assert_eq!(record.level, 0);
        assert!(!record.transforming);
        assert!(record.skills.is_empty());
        assert!(record.name.is_empty());
    }

    #[test]
    fn narrow_fields_refuse_wide_values() {
        let mut record = new_record("Aldric");
        let spec = field(Tag::new("Levl")).expect("level field");
        let FieldKind::Int { set, .. } = &spec.kind else {
            panic!("level is an int field");
        };
        assert!(!set(&mut record, i64::from(i32::MAX) + 1));
        assert!(set(&mut record, 30));
        assert_eq!(record.level, 30);
    }
}
