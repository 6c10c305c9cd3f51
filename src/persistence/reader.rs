//! Record loading: seed every field with its default, dispatch each tagged
//! line through a registry, then reconcile derived state.

use crate::entities::flags::FlagSet;
use crate::entities::player::PlayerRecord;
use crate::error::{LoadAnomaly, PfileError, PfileResult};
use crate::persistence::defaults::{fields, seed_defaults, FieldKind, FieldSpec};
use crate::persistence::subrecord::{codecs, read_section, SubRecordCodec};
use crate::persistence::tag::{self, LineCursor, Tag};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Anomalies met while loading one record. None of them stop the load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub name: String,
    pub anomalies: Vec<LoadAnomaly>,
}

impl LoadReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            anomalies: Vec::new(),
        }
    }

    pub fn note(&mut self, anomaly: LoadAnomaly) {
        warn!(player = %self.name, "{}", anomaly);
        self.anomalies.push(anomaly);
    }

    pub fn malformed(&mut self, tag: Tag, value: &str) {
        self.note(LoadAnomaly::MalformedLine {
            tag: tag_name(tag),
            value: value.to_string(),
        });
    }

    pub fn out_of_range(&mut self, tag: Tag, index: i64) {
        self.note(LoadAnomaly::OutOfRangeIndex {
            tag: tag_name(tag),
            index,
        });
    }

    pub fn truncated(&mut self, tag: Tag) {
        self.note(LoadAnomaly::Truncated { tag: tag_name(tag) });
    }

    pub fn unknown_tag(&mut self, tag: Tag) {
        warn!("Unknown tag {} in pfile {}", tag_name(tag), self.name);
        self.anomalies
            .push(LoadAnomaly::UnknownTag { tag: tag_name(tag) });
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn malformed_count(&self) -> usize {
        self.count(|anomaly| {
            matches!(
                anomaly,
                LoadAnomaly::MalformedLine { .. }
                    | LoadAnomaly::Unparsable { .. }
                    | LoadAnomaly::Truncated { .. }
            )
        })
    }

    pub fn out_of_range_count(&self) -> usize {
        self.count(|anomaly| matches!(anomaly, LoadAnomaly::OutOfRangeIndex { .. }))
    }

    pub fn unknown_tag_count(&self) -> usize {
        self.count(|anomaly| matches!(anomaly, LoadAnomaly::UnknownTag { .. }))
    }

    fn count(&self, filter: impl Fn(&LoadAnomaly) -> bool) -> usize {
        self.anomalies.iter().filter(|anomaly| filter(anomaly)).count()
    }
}

fn tag_name(tag: Tag) -> String {
    tag.as_str().trim_end().to_string()
}

enum Handler {
    Field(&'static FieldSpec),
    Section(&'static dyn SubRecordCodec),
}

static HANDLERS: OnceLock<HashMap<Tag, Handler>> = OnceLock::new();

fn handlers() -> &'static HashMap<Tag, Handler> {
    HANDLERS.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in fields() {
            map.insert(spec.tag, Handler::Field(spec));
        }
        for codec in codecs() {
            map.insert(codec.tag(), Handler::Section(codec.as_ref()));
        }
        map
    })
}

pub fn is_known_tag(tag: Tag) -> bool {
    handlers().contains_key(&tag)
}

/// Decodes a record from its file contents. `name` labels log lines and
/// stands in for the stored name when the file carries none.
pub fn decode_record(name: &str, data: &str) -> (PlayerRecord, LoadReport) {
    let mut record = PlayerRecord::blank();
    seed_defaults(&mut record);
    let mut report = LoadReport::new(name);
    let mut cursor = LineCursor::new(data);

    while let Some(line) = cursor.next_data() {
        let Ok((tag, value)) = tag::decode_line(line) else {
            report.note(LoadAnomaly::Unparsable {
                line: line.to_string(),
            });
            continue;
        };
        match handlers().get(&tag) {
            Some(Handler::Field(spec)) => {
                assign_field(spec, value, &mut cursor, &mut record, &mut report)
            }
            Some(Handler::Section(codec)) => {
                read_section(*codec, value, &mut cursor, &mut record, &mut report)
            }
            None => report.unknown_tag(tag),
        }
    }

    finalize(name, &mut record);
    (record, report)
}

fn assign_field(
    spec: &FieldSpec,
    value: &str,
    cursor: &mut LineCursor<'_>,
    record: &mut PlayerRecord,
    report: &mut LoadReport,
) {
    let accepted = match &spec.kind {
        FieldKind::Int { set, .. } => tag::parse_int(value).is_some_and(|value| set(record, value)),
        FieldKind::Pair { set, .. } => {
            tag::decode_pair(value).is_some_and(|(first, second)| set(record, first, second))
        }
        FieldKind::Flags { set, .. } => match tag::decode_flags(value) {
            Some(words) => {
                set(record, FlagSet::from_words(words));
                true
            }
            None => false,
        },
        FieldKind::Text { set, .. } => {
            set(record, value.to_string());
            true
        }
        FieldKind::Block { set, .. } => {
            let (text, terminated) = cursor.read_block();
            if !terminated {
                report.truncated(spec.tag);
            }
            set(record, text);
            true
        }
        FieldKind::FlagRows { words, rows_mut, .. } => match decode_flag_row(value, *words) {
            Some((index, flags)) => {
                match usize::try_from(index)
                    .ok()
                    .and_then(|index| rows_mut(record).get_mut(index))
                {
                    Some(row) => *row = flags,
                    None => report.out_of_range(spec.tag, index),
                }
                true
            }
            None => false,
        },
        FieldKind::IntList { push, .. } => {
            match tag::parse_int(value).and_then(|value| i32::try_from(value).ok()) {
                Some(value) => {
                    push(record, value);
                    true
                }
                None => false,
            }
        }
    };
    if !accepted {
        report.malformed(spec.tag, value);
    }
}

/// Splits `index w0 ..` into the row index and its flag words. Rows may
/// carry fewer words than `words`, never more.
fn decode_flag_row(value: &str, words: usize) -> Option<(i64, FlagSet)> {
    let (index, rest) = value.trim().split_once(char::is_whitespace)?;
    if rest.split_whitespace().count() > words {
        return None;
    }
    Some((tag::parse_int(index)?, FlagSet::from_words(tag::decode_flags(rest)?)))
}

fn finalize(name: &str, record: &mut PlayerRecord) {
    if record.name.is_empty() {
        record.name = name.to_string();
    }
    record.recompute_derived();
    let total = record.class_level_total();
    if total > i64::from(record.level) {
        warn!(
            player = %record.name,
            total,
            level = record.level,
            "class levels exceed character level"
        );
    }
}

/// Reads and decodes the record file at `path`. A missing file is
/// `NotFound`; any other I/O failure is surfaced as-is.
pub fn read_record(path: &Path, name: &str) -> PfileResult<(PlayerRecord, LoadReport)> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(PfileError::NotFound(name.to_string()))
        }
        Err(err) => return Err(PfileError::io("read", path, err)),
    };
    let data = String::from_utf8_lossy(&bytes);
    Ok(decode_record(name, &data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::effects::{ActiveEffect, ApplyLocation, DamageReduction};
    use crate::entities::equipment::{EquippedItem, WearSlot};
    use crate::entities::flags::plr;
    use crate::entities::player::{class, Alias, PreparedSpell, SpellSlot};
    use crate::persistence::buffer::INITIAL_CAPACITY;
    use crate::persistence::defaults::new_record;
    use crate::persistence::snapshot::with_snapshot;
    use crate::persistence::writer::{encode_record, SaveMode};
    use proptest::prelude::*;

    fn encode(record: &mut PlayerRecord) -> String {
        let buffer = with_snapshot(record, |raw, held| {
            encode_record(raw, held, SaveMode::Normal, INITIAL_CAPACITY)
        })
        .expect("encode");
        String::from_utf8(buffer.finish().expect("bytes")).expect("utf8")
    }

    fn warrior() -> PlayerRecord {
        let mut record = new_record("Aldric");
        record.id = 17;
        record.level = 5;
        record.class = class::WARRIOR;
        record.set_class_level(class::WARRIOR, 5).expect("levels");
        record.abilities.str = 16;
        record.abilities.int = 11;
        record.abilities.wis = 12;
        record.abilities.dex = 14;
        record.abilities.con = 15;
        record.abilities.cha = 9;
        record.recompute_derived();
        record.equip(
            WearSlot::Body,
            EquippedItem::new(3040).with_apply(ApplyLocation::ArmorClass.code(), 10),
        );
        record.equip(WearSlot::Held, EquippedItem::new(3101));
        record
            .add_effect(ActiveEffect::new(31, 10, ApplyLocation::Dex, 2))
            .expect("room");
        record
    }

    #[test]
    fn warrior_roundtrip() {
        let mut record = warrior();
        let text = encode(&mut record);
        let (loaded, report) = decode_record("aldric", &text);
        assert!(report.is_clean(), "{:?}", report.anomalies);
        assert_eq!(loaded.class_levels.get(class::WARRIOR), 5);
        assert_eq!(loaded.class_levels.len(), 1);
        assert_eq!(loaded.abilities, record.abilities);
        assert_eq!(loaded.equipment(), record.equipment());
        assert!(loaded.equipment().slot(WearSlot::Body).is_some());
        assert!(loaded.equipment().slot(WearSlot::Held).is_some());
        assert_eq!(loaded.effects().len(), 1);
        assert_eq!(loaded.effects()[0].duration, 10);
        assert_eq!(loaded.effects()[0].modifier, 2);
        assert_eq!(loaded.derived(), record.derived());
        assert_eq!(loaded, record);
    }

    #[test]
    fn full_record_roundtrip_is_idempotent() {
        let mut record = warrior();
        record.title = "the Bold".to_string();
        record.description = "Tall.\n\nScarred.".to_string();
        record.gold = 5_000_000_000;
        record.pools.hit = 40;
        record.pools.max_hit = 55;
        record.act_flags.set(plr::NODELETE);
        record.pref_flags.set(40);
        record.points.saves[2] = 3;
        record.points.resistances[19] = -5;
        record.skills.set(599, 12).expect("in range");
        record.feats.set(3, 1).expect("in range");
        record.languages.set(0, 1).expect("in range");
        record.known_spells.insert((class::WIZARD, 21));
        record.prep_queue.push(PreparedSpell {
            class: class::WIZARD,
            spell: 21,
            metamagic: 0,
            prep_time: 6,
        });
        record.prep_timers[0][0] = 6;
        record.completed_quests.extend([3, 9]);
        record.aliases.push(Alias {
            alias: "gg".to_string(),
            replacement: "get gold corpse".to_string(),
            kind: 1,
        });
        record.damage_reduction.push(DamageReduction {
            amount: 3,
            max_damage: 30,
            feat: 12,
            ..DamageReduction::default()
        });
        record.coords = [120, -40];
        record.script_triggers.extend([7, 8]);
        record.combat_feats[3] = FlagSet::from_words([1 << 4, 0, 1, 0]);
        record.school_feats[8].set(2);
        record.skill_focus[12] = [1, 1];
        record.buffs[0] = [21, 1];
        record.bombs[1] = 3;
        record.judgements[0] = 1;
        record.prayed[5][0] = 21;
        record.spell_collection.push(SpellSlot {
            class: class::WIZARD,
            spell: 21,
            metamagic: 1,
            prep_time: 0,
            domain: 0,
        });

        let first = encode(&mut record);
        let (mut loaded, report) = decode_record("aldric", &first);
        assert!(report.is_clean(), "{:?}", report.anomalies);
        assert_eq!(loaded, record);
        let second = encode(&mut loaded);
        assert_eq!(first, second);
    }

    #[test]
    fn absent_fields_read_as_defaults() {
        let (record, report) = decode_record("aldric", "Name: Aldric\nLevl: 3\n");
        assert!(report.is_clean());
        assert_eq!(record.level, 3);
        assert_eq!(record.page_length, 40);
        assert_eq!(record.size, -1);
        assert!(record.skills.is_empty());
    }

    #[test]
    fn unknown_tag_is_skipped() {
        let (record, report) = decode_record("aldric", "Name: Aldric\nZZZZ: 7\nLevl: 9\n");
        assert_eq!(record.level, 9);
        assert_eq!(record.name, "Aldric");
        assert_eq!(report.unknown_tag_count(), 1);
    }

    #[test]
    fn out_of_range_skill_does_not_stop_later_sections() {
        let text = "Name: Aldric\nSkil:\n5 40\n7000 1\n0 0\nFeat:\n3 1\n0 0\nLevl: 4\n";
        let (record, report) = decode_record("aldric", text);
        assert_eq!(record.skills.get(5), 40);
        assert_eq!(record.skills.len(), 1);
        assert_eq!(record.feats.get(3), 1);
        assert_eq!(record.level, 4);
        assert_eq!(report.out_of_range_count(), 1);
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let text = "Name: Aldric\nPage: lots\nHit : 10\nAct : a b c d e\nLevl: 2\nnonsense\n";
        let (record, report) = decode_record("aldric", text);
        assert_eq!(record.page_length, 40);
        assert_eq!(record.pools.hit, 0);
        assert!(record.act_flags.is_empty());
        assert_eq!(record.level, 2);
        assert_eq!(report.malformed_count(), 4);
    }

    #[test]
    fn comments_and_crlf_are_tolerated() {
        let text = "* written by hand\r\nName: Aldric\r\n\r\nLevl: 6\r\nDesc:\r\nline\r\n~\r\n";
        let (record, report) = decode_record("aldric", text);
        assert!(report.is_clean());
        assert_eq!(record.level, 6);
        assert_eq!(record.description, "line");
    }

    #[test]
    fn missing_name_falls_back_to_label() {
        let (record, _) = decode_record("aldric", "Levl: 1\n");
        assert_eq!(record.name, "aldric");
    }

    #[test]
    fn aliases_keep_comment_like_and_blank_text() {
        let mut record = warrior();
        record.aliases.extend([
            Alias {
                alias: "*h".to_string(),
                replacement: "say hi".to_string(),
                kind: 0,
            },
            Alias {
                alias: String::new(),
                replacement: "  ".to_string(),
                kind: 1,
            },
            Alias {
                alias: "kk".to_string(),
                replacement: "kill kobold".to_string(),
                kind: 0,
            },
        ]);
        record.events.set(3, 20).expect("in range");
        let text = encode(&mut record);
        let (loaded, report) = decode_record("aldric", &text);
        assert!(report.is_clean(), "{:?}", report.anomalies);
        assert_eq!(loaded.aliases, record.aliases);
        assert_eq!(loaded.events.get(3), 20);
    }

    #[test]
    fn section_without_terminator_gives_way_to_next_tag() {
        let text = "Name: Aldric\nSkil:\n5 40\nLevl: 4\nPage: 60\nTitl: the Bold\n";
        let (record, report) = decode_record("aldric", text);
        assert_eq!(record.skills.get(5), 40);
        assert_eq!(record.level, 4);
        assert_eq!(record.page_length, 60);
        assert_eq!(record.title, "the Bold");
        assert_eq!(
            report.anomalies,
            vec![LoadAnomaly::Truncated {
                tag: "Skil".to_string()
            }]
        );
    }

    #[test]
    fn feat_flag_rows_repeat_their_tag() {
        let mut record = warrior();
        record.combat_feats[0].set(1);
        record.combat_feats[2] = FlagSet::from_words([0, 0, 0, 1 << 27]);
        record.school_feats[4].set(0);
        let text = encode(&mut record);
        assert!(text.contains("CbFt: 0 b 0 0 0\nCbFt: 2 0 0 0 B\n"));
        assert!(text.contains("SclF: 4 a\n"));

        let text = "Name: Aldric\nCbFt: 1 c\nCbFt: 12 a 0 0 0\nSclF: 0 a b\nSclF: 3 0\n";
        let (loaded, report) = decode_record("aldric", text);
        assert_eq!(loaded.combat_feats[1].words(), [1 << 2, 0, 0, 0]);
        assert!(loaded.school_feats.iter().all(FlagSet::is_empty));
        assert_eq!(report.out_of_range_count(), 1);
        assert_eq!(report.malformed_count(), 1);
    }

    #[test]
    fn extreme_values_load_without_overflow() {
        let text = "Name: Aldric\nStr : 10/0\nAffs:\n1 10 2147483647 1 0 0 0 0 0 0\n\
                    0 0 0 0 0 0 0 0 0 0\nCLvl:\n1 2147483647\n2 1\n-1 -1\n";
        let (record, _) = decode_record("aldric", text);
        assert_eq!(record.derived().abilities.str, i32::MAX);
        assert_eq!(record.class_level_total(), i64::from(i32::MAX) + 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = read_record(&dir.path().join("nobody.plr"), "nobody").expect_err("missing");
        assert!(err.is_not_found());
    }

    fn alias_strategy() -> impl Strategy<Value = Alias> {
        ("[ a-z*]{0,6}", "[ -}]{0,20}", 0i32..3).prop_map(|(alias, replacement, kind)| Alias {
            alias,
            replacement,
            kind,
        })
    }

    fn effect_strategy() -> impl Strategy<Value = ActiveEffect> {
        let locations = prop::sample::select(vec![
            ApplyLocation::Str,
            ApplyLocation::Dex,
            ApplyLocation::Hit,
            ApplyLocation::ArmorClass,
            ApplyLocation::Save(1),
        ]);
        (1i32..400, 1i32..50, locations, -5i32..=5).prop_map(
            |(spell, duration, location, modifier)| {
                ActiveEffect::new(spell, duration, location, modifier)
            },
        )
    }

    proptest! {
        #[test]
        fn any_record_roundtrips(
            name in "[A-Z][a-z]{2,10}",
            level in 1i32..60,
            abilities in prop::array::uniform6(3i32..25),
            gold in 0i64..10_000_000_000,
            title in "([a-z]{1,8}( [a-z]{1,8}){0,2})?",
            description in prop::collection::vec("[a-z *]{0,12}", 0..4),
            skills in prop::collection::btree_map(1i32..600, 1i32..=100, 0..12),
            aliases in prop::collection::vec(alias_strategy(), 0..4),
            effects in prop::collection::vec(effect_strategy(), 0..4),
            vnum in prop::option::of(1i32..9000),
        ) {
            let mut record = new_record(&name);
            record.level = level;
            record.set_class_level(class::WIZARD, level).expect("levels");
            record.abilities.str = abilities[0];
            record.abilities.int = abilities[1];
            record.abilities.wis = abilities[2];
            record.abilities.dex = abilities[3];
            record.abilities.con = abilities[4];
            record.abilities.cha = abilities[5];
            record.gold = gold;
            record.title = title;
            record.description = description.join("\n");
            for (skill, value) in &skills {
                record.skills.set(*skill, *value).expect("in range");
            }
            record.aliases = aliases;
            record.recompute_derived();
            for effect in effects {
                record.add_effect(effect).expect("room");
            }
            if let Some(vnum) = vnum {
                record.equip(WearSlot::Body, EquippedItem::new(vnum).with_apply(ApplyLocation::Hit.code(), 4));
            }

            let first = encode(&mut record);
            let (mut loaded, report) = decode_record(&name, &first);
            prop_assert!(report.is_clean(), "{:?}", report.anomalies);
            prop_assert_eq!(&loaded, &record);
            prop_assert_eq!(encode(&mut loaded), first);
        }
    }
}
