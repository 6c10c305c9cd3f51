//! Codecs for the array-shaped parts of a record.
//!
//! A section starts with a header line (`Skil:`), carries one data line per
//! entry and ends according to its [`Termination`]. Sections are
//! independent: a file without a given section leaves that table at its
//! default.

use crate::entities::effects::{ActiveEffect, DamageReduction, MAX_DR_BYPASS};
use crate::entities::equipment::{EquippedItem, WearSlot, NUM_WEARS};
use crate::entities::player::{
    Alias, PlayerRecord, PreparedSpell, SpellSlot, MAX_BOMBS_ALLOWED, MAX_CLASSES,
    MAX_COMPLETED_QUESTS, MAX_MEM, MAX_SPELLS, NUM_BLACKGUARD_CRUELTIES, NUM_CASTERS, NUM_CIRCLES,
    NUM_INQ_JUDGEMENTS, NUM_PALADIN_MERCIES, NUM_SKFEATS,
};
use crate::entities::tables::SparseTable;
use crate::persistence::buffer::RecordBuffer;
use crate::persistence::reader::{is_known_tag, LoadReport};
use crate::persistence::snapshot::Held;
use crate::persistence::tag::{self, parse_ints, LineCursor, Tag};
use crate::persistence::writer::SaveMode;
use std::collections::HashSet;
use std::fmt::{self, Write};
use std::sync::OnceLock;

/// Highest affect bit accepted from the single-bit legacy effect lines.
const NUM_AFF_FLAGS: i64 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Reading stops at a line whose fields equal the sentinel's.
    Sentinel(&'static str),
    /// The header carries the number of entries inline.
    CountPrefixed,
    /// A fixed number of entries follows the header.
    Fixed(usize),
}

impl Termination {
    pub fn is_sentinel(&self, line: &str) -> bool {
        match self {
            Termination::Sentinel(sentinel) => {
                line.split_whitespace().eq(sentinel.split_whitespace())
            }
            _ => false,
        }
    }
}

/// What a codec may read while encoding: the stripped record and the state
/// held out of it for the duration of the write.
pub struct EncodeSource<'a> {
    pub record: &'a PlayerRecord,
    pub held: &'a Held,
    pub mode: SaveMode,
}

pub trait SubRecordCodec: Send + Sync {
    fn tag(&self) -> Tag;

    fn termination(&self) -> Termination;

    fn should_write(&self, _source: &EncodeSource<'_>) -> bool {
        true
    }

    /// Entry count for count-prefixed sections.
    fn count(&self, _source: &EncodeSource<'_>) -> usize {
        0
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result;

    /// Decodes one entry whose first line is `line`. Multi-line entries pull
    /// their remaining lines from `cursor`.
    fn read_entry(
        &self,
        line: &str,
        cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    );

    /// Called when the section header is seen, before any entry.
    fn begin_section(&self, _record: &mut PlayerRecord) {}

    /// Called once the section is over, however it ended.
    fn end_section(&self, _record: &mut PlayerRecord) {}
}

pub fn write_section(
    codec: &dyn SubRecordCodec,
    source: &EncodeSource<'_>,
    out: &mut RecordBuffer,
) -> fmt::Result {
    if !codec.should_write(source) {
        return Ok(());
    }
    match codec.termination() {
        Termination::CountPrefixed => {
            tag::write_line(out, codec.tag(), codec.count(source))?;
            codec.write_entries(source, out)
        }
        Termination::Sentinel(sentinel) => {
            tag::write_header(out, codec.tag())?;
            codec.write_entries(source, out)?;
            writeln!(out, "{}", sentinel)
        }
        Termination::Fixed(_) => {
            tag::write_header(out, codec.tag())?;
            codec.write_entries(source, out)
        }
    }
}

pub fn read_section(
    codec: &dyn SubRecordCodec,
    inline: &str,
    cursor: &mut LineCursor<'_>,
    record: &mut PlayerRecord,
    report: &mut LoadReport,
) {
    codec.begin_section(record);
    read_entries(codec, inline, cursor, record, report);
    codec.end_section(record);
}

fn read_entries(
    codec: &dyn SubRecordCodec,
    inline: &str,
    cursor: &mut LineCursor<'_>,
    record: &mut PlayerRecord,
    report: &mut LoadReport,
) {
    let expected = match codec.termination() {
        Termination::Sentinel(_) => None,
        Termination::Fixed(count) => Some(count),
        Termination::CountPrefixed => match tag::parse_int(inline) {
            Some(count) if count >= 0 => Some(count as usize),
            _ => {
                report.malformed(codec.tag(), inline);
                return;
            }
        },
    };
    let termination = codec.termination();
    let mut read = 0usize;
    loop {
        if expected.is_some_and(|count| read >= count) {
            return;
        }
        // Count-prefixed entries are free text and taken verbatim.
        let next = match termination {
            Termination::CountPrefixed => cursor.next_raw(),
            _ => cursor.next_data(),
        };
        let Some(line) = next else {
            report.truncated(codec.tag());
            return;
        };
        if termination.is_sentinel(line) {
            return;
        }
        if termination != Termination::CountPrefixed && opens_known_tag(line) {
            report.truncated(codec.tag());
            cursor.push_back(line);
            return;
        }
        codec.read_entry(line, cursor, record, report);
        read += 1;
    }
}

/// True for a line that starts another field or section, meaning the
/// current section lost its terminator.
fn opens_known_tag(line: &str) -> bool {
    tag::decode_line(line).is_ok_and(|(tag, _)| is_known_tag(tag))
}

fn fields_exact(
    tag: Tag,
    line: &str,
    count: usize,
    report: &mut LoadReport,
) -> Option<Vec<i32>> {
    let values = parse_ints(line)
        .filter(|values| values.len() == count)
        .and_then(|values| {
            values
                .into_iter()
                .map(|value| i32::try_from(value).ok())
                .collect::<Option<Vec<i32>>>()
        });
    if values.is_none() {
        report.malformed(tag, line);
    }
    values
}

/// `index value` lines over a bounded sparse table.
pub struct SparseCodec {
    tag: Tag,
    sentinel: &'static str,
    table: fn(&PlayerRecord) -> &SparseTable,
    table_mut: fn(&mut PlayerRecord) -> &mut SparseTable,
    skip_when_extracting: bool,
}

impl SparseCodec {
    fn new(
        tag: &str,
        sentinel: &'static str,
        table: fn(&PlayerRecord) -> &SparseTable,
        table_mut: fn(&mut PlayerRecord) -> &mut SparseTable,
    ) -> Self {
        Self {
            tag: Tag::new(tag),
            sentinel,
            table,
            table_mut,
            skip_when_extracting: false,
        }
    }

    fn skip_when_extracting(mut self) -> Self {
        self.skip_when_extracting = true;
        self
    }
}

impl SubRecordCodec for SparseCodec {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel(self.sentinel)
    }

    fn should_write(&self, source: &EncodeSource<'_>) -> bool {
        !(self.skip_when_extracting && source.mode == SaveMode::Extracting)
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for (index, value) in (self.table)(source.record).iter() {
            writeln!(out, "{} {}", index, value)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag, line, 2, report) else {
            return;
        };
        if (self.table_mut)(record).set(values[0], values[1]).is_err() {
            report.out_of_range(self.tag, values[0].into());
        }
    }
}

/// Completed quest ids, one per line.
struct QuestCodec;

impl SubRecordCodec for QuestCodec {
    fn tag(&self) -> Tag {
        Tag::new("Qest")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for quest in &source.record.completed_quests {
            writeln!(out, "{}", quest)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag(), line, 1, report) else {
            return;
        };
        if record.completed_quests.len() >= MAX_COMPLETED_QUESTS {
            report.out_of_range(self.tag(), record.completed_quests.len() as i64);
            return;
        }
        record.completed_quests.push(values[0]);
    }
}

fn valid_class(class: i32) -> bool {
    (0..MAX_CLASSES).contains(&class)
}

fn valid_spell(spell: i32) -> bool {
    (1..MAX_SPELLS).contains(&spell)
}

/// `class spell` pairs of spells a caster has learned.
struct KnownSpellsCodec;

impl SubRecordCodec for KnownSpellsCodec {
    fn tag(&self) -> Tag {
        Tag::new("KnSp")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1 -1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for (class, spell) in &source.record.known_spells {
            writeln!(out, "{} {}", class, spell)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag(), line, 2, report) else {
            return;
        };
        let (class, spell) = (values[0], values[1]);
        if !valid_class(class) {
            report.out_of_range(self.tag(), class.into());
        } else if !valid_spell(spell) {
            report.out_of_range(self.tag(), spell.into());
        } else {
            record.known_spells.insert((class, spell));
        }
    }
}

/// Ordered spell preparation queue: `class spell metamagic prep_time`.
struct PrepQueueCodec;

impl SubRecordCodec for PrepQueueCodec {
    fn tag(&self) -> Tag {
        Tag::new("PrQu")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1 -1 -1 -1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for entry in &source.record.prep_queue {
            writeln!(
                out,
                "{} {} {} {}",
                entry.class, entry.spell, entry.metamagic, entry.prep_time
            )?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag(), line, 4, report) else {
            return;
        };
        if !valid_class(values[0]) {
            report.out_of_range(self.tag(), values[0].into());
            return;
        }
        if !valid_spell(values[1]) {
            report.out_of_range(self.tag(), values[1].into());
            return;
        }
        record.prep_queue.push(PreparedSpell {
            class: values[0],
            spell: values[1],
            metamagic: values[2],
            prep_time: values[3],
        });
    }
}

/// What the second column of a slot queue line holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotColumn {
    Spell,
    Circle,
}

/// Ordered `class spell metamagic prep_time domain` lines.
struct SlotQueueCodec {
    tag: Tag,
    column: SlotColumn,
    queue: fn(&PlayerRecord) -> &Vec<SpellSlot>,
    queue_mut: fn(&mut PlayerRecord) -> &mut Vec<SpellSlot>,
}

impl SubRecordCodec for SlotQueueCodec {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1 -1 -1 -1 -1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for slot in (self.queue)(source.record) {
            writeln!(
                out,
                "{} {} {} {} {}",
                slot.class, slot.spell, slot.metamagic, slot.prep_time, slot.domain
            )?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag, line, 5, report) else {
            return;
        };
        let valid_second = match self.column {
            SlotColumn::Spell => valid_spell(values[1]),
            SlotColumn::Circle => (0..NUM_CIRCLES).contains(&values[1]),
        };
        if !valid_class(values[0]) {
            report.out_of_range(self.tag, values[0].into());
            return;
        }
        if !valid_second {
            report.out_of_range(self.tag, values[1].into());
            return;
        }
        let queue = (self.queue_mut)(record);
        if queue.len() >= MAX_MEM {
            report.out_of_range(self.tag, queue.len() as i64);
            return;
        }
        queue.push(SpellSlot {
            class: values[0],
            spell: values[1],
            metamagic: values[2],
            prep_time: values[3],
            domain: values[4],
        });
    }
}

/// Fixed-width rows: `row v0 .. vN`. Only rows holding a non-zero value
/// are written. The column count `W` is part of the line shape; changing
/// it needs a format version bump.
pub struct GridCodec<const W: usize> {
    tag: Tag,
    sentinel: &'static str,
    rows: fn(&PlayerRecord) -> &[[i32; W]],
    rows_mut: fn(&mut PlayerRecord) -> &mut [[i32; W]],
}

impl<const W: usize> GridCodec<W> {
    fn new(
        tag: &str,
        sentinel: &'static str,
        rows: fn(&PlayerRecord) -> &[[i32; W]],
        rows_mut: fn(&mut PlayerRecord) -> &mut [[i32; W]],
    ) -> Self {
        Self {
            tag: Tag::new(tag),
            sentinel,
            rows,
            rows_mut,
        }
    }
}

impl<const W: usize> SubRecordCodec for GridCodec<W> {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel(self.sentinel)
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for (row, columns) in (self.rows)(source.record).iter().enumerate() {
            if columns.iter().all(|value| *value == 0) {
                continue;
            }
            write!(out, "{}", row)?;
            for value in columns {
                write!(out, " {}", value)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag, line, 1 + W, report) else {
            return;
        };
        let row = values[0];
        let Some(slot) = usize::try_from(row)
            .ok()
            .and_then(|row| (self.rows_mut)(record).get_mut(row))
        else {
            report.out_of_range(self.tag, row.into());
            return;
        };
        slot.copy_from_slice(&values[1..]);
    }
}

/// Positional values, one per line, closed by a lone `-1`. Trailing zeros
/// are not written; a short section leaves the tail at zero.
pub struct ListCodec {
    tag: Tag,
    len: usize,
    list: fn(&PlayerRecord) -> &Vec<i32>,
    list_mut: fn(&mut PlayerRecord) -> &mut Vec<i32>,
}

impl ListCodec {
    fn new(
        tag: &str,
        len: usize,
        list: fn(&PlayerRecord) -> &Vec<i32>,
        list_mut: fn(&mut PlayerRecord) -> &mut Vec<i32>,
    ) -> Self {
        Self {
            tag: Tag::new(tag),
            len,
            list,
            list_mut,
        }
    }
}

impl SubRecordCodec for ListCodec {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        let list = (self.list)(source.record);
        let used = list.iter().rposition(|value| *value != 0).map_or(0, |last| last + 1);
        for value in &list[..used] {
            writeln!(out, "{}", value)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = fields_exact(self.tag, line, 1, report) else {
            return;
        };
        let list = (self.list_mut)(record);
        if list.len() >= self.len {
            report.out_of_range(self.tag, list.len() as i64);
            return;
        }
        list.push(values[0]);
    }

    fn begin_section(&self, record: &mut PlayerRecord) {
        (self.list_mut)(record).clear();
    }

    fn end_section(&self, record: &mut PlayerRecord) {
        (self.list_mut)(record).resize(self.len, 0);
    }
}

/// Single `x y` line with the wilderness coordinates.
struct CoordsCodec;

impl SubRecordCodec for CoordsCodec {
    fn tag(&self) -> Tag {
        Tag::new("CLoc")
    }

    fn termination(&self) -> Termination {
        Termination::Fixed(1)
    }

    fn should_write(&self, source: &EncodeSource<'_>) -> bool {
        source.record.coords != [0, 0]
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        let [x, y] = source.record.coords;
        writeln!(out, "{} {}", x, y)
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        if let Some(values) = fields_exact(self.tag(), line, 2, report) {
            record.coords = [values[0], values[1]];
        }
    }
}

/// Aliases: the header holds the count; each alias spans three lines.
struct AliasCodec;

impl SubRecordCodec for AliasCodec {
    fn tag(&self) -> Tag {
        Tag::new("Alis")
    }

    fn termination(&self) -> Termination {
        Termination::CountPrefixed
    }

    fn should_write(&self, source: &EncodeSource<'_>) -> bool {
        !source.record.aliases.is_empty()
    }

    fn count(&self, source: &EncodeSource<'_>) -> usize {
        source.record.aliases.len()
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for alias in &source.record.aliases {
            writeln!(out, " {}", alias.alias)?;
            writeln!(out, " {}", alias.replacement)?;
            writeln!(out, "{}", alias.kind)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let (Some(replacement), Some(kind)) = (cursor.next_raw(), cursor.next_raw()) else {
            report.truncated(self.tag());
            return;
        };
        let Some(kind) = tag::parse_int(kind).and_then(|kind| i32::try_from(kind).ok()) else {
            report.malformed(self.tag(), kind);
            return;
        };
        record.aliases.push(Alias {
            alias: strip_lead(line),
            replacement: strip_lead(replacement),
            kind,
        });
    }
}

fn strip_lead(line: &str) -> String {
    line.strip_prefix(' ').unwrap_or(line).to_string()
}

/// Worn items: `slot vnum [location modifier]...`.
struct EquipmentCodec;

impl SubRecordCodec for EquipmentCodec {
    fn tag(&self) -> Tag {
        Tag::new("Eqpt")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("-1 -1")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for (slot, item) in source.held.equipment() {
            write!(out, "{} {}", slot.index(), item.vnum)?;
            for (location, modifier) in &item.applies {
                write!(out, " {} {}", location, modifier)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let values = parse_ints(line)
            .filter(|values| values.len() >= 2 && values.len() % 2 == 0)
            .and_then(|values| {
                values
                    .into_iter()
                    .map(|value| i32::try_from(value).ok())
                    .collect::<Option<Vec<i32>>>()
            });
        let Some(values) = values else {
            report.malformed(self.tag(), line);
            return;
        };
        let slot = usize::try_from(values[0])
            .ok()
            .filter(|index| *index < NUM_WEARS)
            .and_then(WearSlot::from_index);
        let Some(slot) = slot else {
            report.out_of_range(self.tag(), values[0].into());
            return;
        };
        if record.equipment().slot(slot).is_some() {
            report.malformed(self.tag(), line);
            return;
        }
        let mut item = EquippedItem::new(values[1]);
        for apply in values[2..].chunks_exact(2) {
            item = item.with_apply(apply[0], apply[1]);
        }
        record.equip(slot, item);
    }
}

/// Active effects: `spell duration modifier location bv0 bv1 bv2 bv3
/// bonus_type specific`. Older 5, 8 and 9 field lines are still read.
struct EffectsCodec;

fn to_word(value: i64) -> Option<u32> {
    u32::try_from(value)
        .ok()
        .or_else(|| i32::try_from(value).ok().map(|value| value as u32))
}

impl SubRecordCodec for EffectsCodec {
    fn tag(&self) -> Tag {
        Tag::new("Affs")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("0 0 0 0 0 0 0 0 0 0")
    }

    fn should_write(&self, source: &EncodeSource<'_>) -> bool {
        !source.held.effects().is_empty()
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        for effect in source.held.effects() {
            let [bv0, bv1, bv2, bv3] = effect.bitvector;
            writeln!(
                out,
                "{} {} {} {} {} {} {} {} {} {}",
                effect.spell,
                effect.duration,
                effect.modifier,
                effect.location,
                bv0,
                bv1,
                bv2,
                bv3,
                effect.bonus_type,
                effect.specific
            )?;
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        _cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let Some(values) = parse_ints(line).filter(|values| matches!(values.len(), 5 | 8 | 9 | 10))
        else {
            report.malformed(self.tag(), line);
            return;
        };
        let narrow = |index: usize| i32::try_from(values[index]).ok();
        let (Some(spell), Some(duration), Some(modifier), Some(location)) =
            (narrow(0), narrow(1), narrow(2), narrow(3))
        else {
            report.malformed(self.tag(), line);
            return;
        };
        if spell <= 0 {
            report.malformed(self.tag(), line);
            return;
        }
        let mut effect = ActiveEffect {
            spell,
            duration,
            modifier,
            location,
            ..ActiveEffect::default()
        };
        if values.len() == 5 {
            let bit = values[4];
            if bit > 0 && bit < NUM_AFF_FLAGS {
                effect.bitvector[(bit / 32) as usize] |= 1u32 << (bit % 32);
            }
        } else {
            let words: Option<Vec<u32>> = values[4..8].iter().map(|value| to_word(*value)).collect();
            let Some(words) = words else {
                report.malformed(self.tag(), line);
                return;
            };
            effect.bitvector.copy_from_slice(&words);
            if values.len() >= 9 {
                effect.bonus_type = narrow(8).unwrap_or_default();
            }
            if values.len() == 10 {
                effect.specific = narrow(9).unwrap_or_default();
            }
        }
        if record.add_effect(effect).is_err() {
            report.out_of_range(self.tag(), record.effects().len() as i64);
        }
    }
}

/// Damage reduction: `1 amount max_damage spell feat` followed by one
/// `category value` line per bypass slot.
struct DamageReductionCodec;

impl SubRecordCodec for DamageReductionCodec {
    fn tag(&self) -> Tag {
        Tag::new("DmgR")
    }

    fn termination(&self) -> Termination {
        Termination::Sentinel("0 0 0 0 0")
    }

    fn write_entries(&self, source: &EncodeSource<'_>, out: &mut RecordBuffer) -> fmt::Result {
        let mut spells = HashSet::new();
        for entry in source.held.damage_reduction() {
            if entry.is_effect_linked() && !spells.insert(entry.spell) {
                continue;
            }
            writeln!(
                out,
                "1 {} {} {} {}",
                entry.amount, entry.max_damage, entry.spell, entry.feat
            )?;
            for (category, value) in entry.bypass {
                writeln!(out, "{} {}", category, value)?;
            }
        }
        Ok(())
    }

    fn read_entry(
        &self,
        line: &str,
        cursor: &mut LineCursor<'_>,
        record: &mut PlayerRecord,
        report: &mut LoadReport,
    ) {
        let head = fields_exact(self.tag(), line, 5, report);
        let mut entry = DamageReduction::default();
        let mut bypass_ok = true;
        for slot in 0..MAX_DR_BYPASS {
            let Some(bypass) = cursor.next_data() else {
                report.truncated(self.tag());
                return;
            };
            match fields_exact(self.tag(), bypass, 2, report) {
                Some(values) => entry.bypass[slot] = (values[0], values[1]),
                None => bypass_ok = false,
            }
        }
        let Some(head) = head else {
            return;
        };
        if head[0] <= 0 || !bypass_ok {
            if head[0] <= 0 {
                report.malformed(self.tag(), line);
            }
            return;
        }
        entry.amount = head[1];
        entry.max_damage = head[2];
        entry.spell = head[3];
        entry.feat = head[4];
        record.damage_reduction.push(entry);
    }
}

fn build_codecs() -> Vec<Box<dyn SubRecordCodec>> {
    vec![
        Box::new(SparseCodec::new("Skil", "0 0", |r| &r.skills, |r| &mut r.skills)),
        Box::new(SparseCodec::new(
            "Ablt",
            "0 0",
            |r| &r.ability_ranks,
            |r| &mut r.ability_ranks,
        )),
        Box::new(SparseCodec::new("Feat", "0 0", |r| &r.feats, |r| &mut r.feats)),
        Box::new(SparseCodec::new(
            "Evol",
            "0 0",
            |r| &r.evolutions,
            |r| &mut r.evolutions,
        )),
        Box::new(SparseCodec::new(
            "KEvo",
            "0 0",
            |r| &r.known_evolutions,
            |r| &mut r.known_evolutions,
        )),
        Box::new(SparseCodec::new("Potn", "-1", |r| &r.potions, |r| &mut r.potions)),
        Box::new(SparseCodec::new("Scrl", "-1", |r| &r.scrolls, |r| &mut r.scrolls)),
        Box::new(SparseCodec::new("Stav", "-1", |r| &r.staves, |r| &mut r.staves)),
        Box::new(SparseCodec::new("Wand", "-1", |r| &r.wands, |r| &mut r.wands)),
        Box::new(SparseCodec::new(
            "Disc",
            "-1",
            |r| &r.discoveries,
            |r| &mut r.discoveries,
        )),
        Box::new(SparseCodec::new(
            "Lang",
            "-1",
            |r| &r.languages,
            |r| &mut r.languages,
        )),
        Box::new(QuestCodec),
        Box::new(KnownSpellsCodec),
        Box::new(ListCodec::new(
            "Bomb",
            MAX_BOMBS_ALLOWED,
            |r| &r.bombs,
            |r| &mut r.bombs,
        )),
        Box::new(GridCodec::<2>::new("Buff", "-1 -1 -1", |r| &r.buffs, |r| &mut r.buffs)),
        Box::new(ListCodec::new(
            "Mrcy",
            NUM_PALADIN_MERCIES,
            |r| &r.mercies,
            |r| &mut r.mercies,
        )),
        Box::new(ListCodec::new(
            "Clty",
            NUM_BLACKGUARD_CRUELTIES,
            |r| &r.cruelties,
            |r| &mut r.cruelties,
        )),
        Box::new(ListCodec::new(
            "Judg",
            NUM_INQ_JUDGEMENTS,
            |r| &r.judgements,
            |r| &mut r.judgements,
        )),
        Box::new(GridCodec::<NUM_SKFEATS>::new(
            "SklF",
            "-1 -1 -1",
            |r| &r.skill_focus,
            |r| &mut r.skill_focus,
        )),
        Box::new(PrepQueueCodec),
        Box::new(SlotQueueCodec {
            tag: Tag::new("InMa"),
            column: SlotColumn::Circle,
            queue: |r| &r.innate_magic,
            queue_mut: |r| &mut r.innate_magic,
        }),
        Box::new(SlotQueueCodec {
            tag: Tag::new("Coll"),
            column: SlotColumn::Spell,
            queue: |r| &r.spell_collection,
            queue_mut: |r| &mut r.spell_collection,
        }),
        Box::new(GridCodec::<NUM_CASTERS>::new(
            "Pryg",
            "-1 -1",
            |r| &r.praying,
            |r| &mut r.praying,
        )),
        Box::new(GridCodec::<NUM_CASTERS>::new(
            "Prgm",
            "-1 -1",
            |r| &r.praying_metamagic,
            |r| &mut r.praying_metamagic,
        )),
        Box::new(GridCodec::<NUM_CASTERS>::new(
            "Pryd",
            "-1 -1",
            |r| &r.prayed,
            |r| &mut r.prayed,
        )),
        Box::new(GridCodec::<NUM_CASTERS>::new(
            "Prdm",
            "-1 -1",
            |r| &r.prayed_metamagic,
            |r| &mut r.prayed_metamagic,
        )),
        Box::new(GridCodec::<NUM_CASTERS>::new(
            "Pryt",
            "-1 -1",
            |r| &r.prep_timers,
            |r| &mut r.prep_timers,
        )),
        Box::new(SparseCodec::new(
            "CLvl",
            "-1 -1",
            |r| &r.class_levels,
            |r| &mut r.class_levels,
        )),
        Box::new(SparseCodec::new(
            "Cfpt",
            "0",
            |r| &r.class_feat_points,
            |r| &mut r.class_feat_points,
        )),
        Box::new(SparseCodec::new(
            "Ecfp",
            "0",
            |r| &r.epic_class_feat_points,
            |r| &mut r.epic_class_feat_points,
        )),
        Box::new(CoordsCodec),
        Box::new(SparseCodec::new("Ward", "-1 -1", |r| &r.warding, |r| &mut r.warding)),
        Box::new(SparseCodec::new(
            "SpAb",
            "-1 -1",
            |r| &r.special_abilities,
            |r| &mut r.special_abilities,
        )),
        Box::new(SparseCodec::new(
            "FaEn",
            "-1 -1",
            |r| &r.favored_enemies,
            |r| &mut r.favored_enemies,
        )),
        Box::new(AliasCodec),
        Box::new(
            SparseCodec::new("Evnt", "-1 -1", |r| &r.events, |r| &mut r.events)
                .skip_when_extracting(),
        ),
        Box::new(EquipmentCodec),
        Box::new(EffectsCodec),
        Box::new(DamageReductionCodec),
    ]
}

static CODECS: OnceLock<Vec<Box<dyn SubRecordCodec>>> = OnceLock::new();

/// Every section codec in file order.
pub fn codecs() -> &'static [Box<dyn SubRecordCodec>] {
    CODECS.get_or_init(build_codecs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::effects::ApplyLocation;
    use crate::persistence::buffer::INITIAL_CAPACITY;
    use crate::persistence::defaults::new_record;
    use crate::persistence::snapshot::with_snapshot;
    use proptest::prelude::*;

    fn codec(section: &str) -> &'static dyn SubRecordCodec {
        let wanted = Tag::new(section);
        let found: &'static Box<dyn SubRecordCodec> = codecs()
            .iter()
            .find(|codec| codec.tag() == wanted)
            .expect("codec registered");
        &**found
    }

    fn encode(record: &mut PlayerRecord, section: &str, mode: SaveMode) -> String {
        let codec = codec(section);
        with_snapshot(record, |raw, held| {
            let mut out = RecordBuffer::with_capacity(INITIAL_CAPACITY).expect("alloc");
            let source = EncodeSource {
                record: raw,
                held,
                mode,
            };
            write_section(codec, &source, &mut out).expect("encode");
            String::from_utf8(out.finish().expect("bytes")).expect("utf8")
        })
    }

    fn decode(section: &str, text: &str) -> (PlayerRecord, LoadReport) {
        let mut record = new_record("Aldric");
        let mut report = LoadReport::new("Aldric");
        let mut cursor = LineCursor::new(text);
        let header = cursor.next_data().expect("header");
        let (_, inline) = tag::decode_line(header).expect("header tag");
        read_section(codec(section), inline, &mut cursor, &mut record, &mut report);
        (record, report)
    }

    #[test]
    fn empty_sections_emit_only_the_sentinel() {
        let mut record = new_record("Aldric");
        assert_eq!(encode(&mut record, "Skil", SaveMode::Normal), "Skil:\n0 0\n");
        assert_eq!(encode(&mut record, "CLvl", SaveMode::Normal), "CLvl:\n-1 -1\n");
        assert_eq!(encode(&mut record, "Cfpt", SaveMode::Normal), "Cfpt:\n0\n");
        assert_eq!(encode(&mut record, "Qest", SaveMode::Normal), "Qest:\n-1\n");
        assert_eq!(encode(&mut record, "Eqpt", SaveMode::Normal), "Eqpt:\n-1 -1\n");
    }

    #[test]
    fn empty_sections_read_as_empty_tables() {
        let (record, report) = decode("Skil", "Skil:\n0 0\n");
        assert!(record.skills.is_empty());
        assert!(report.anomalies.is_empty());
        let (record, report) = decode("Cfpt", "Cfpt:\n0\n");
        assert!(record.class_feat_points.is_empty());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn out_of_range_entries_are_dropped() {
        let (record, report) = decode("Skil", "Skil:\n12 75\n9000 5\n14 30\n0 0\n");
        assert_eq!(record.skills.get(12), 75);
        assert_eq!(record.skills.get(14), 30);
        assert_eq!(record.skills.len(), 2);
        assert_eq!(report.anomalies.len(), 1);
    }

    #[test]
    fn class_feat_points_keep_class_zero() {
        let mut record = new_record("Aldric");
        record.class_feat_points.set(0, 3).expect("in range");
        let text = encode(&mut record, "Cfpt", SaveMode::Normal);
        assert_eq!(text, "Cfpt:\n0 3\n0\n");
        let (loaded, _) = decode("Cfpt", &text);
        assert_eq!(loaded.class_feat_points.get(0), 3);
    }

    #[test]
    fn events_skipped_when_extracting() {
        let mut record = new_record("Aldric");
        record.events.set(4, 120).expect("in range");
        assert_eq!(encode(&mut record, "Evnt", SaveMode::Extracting), "");
        assert_eq!(
            encode(&mut record, "Evnt", SaveMode::Normal),
            "Evnt:\n4 120\n-1 -1\n"
        );
    }

    #[test]
    fn prep_timers_use_fixed_columns() {
        let mut record = new_record("Aldric");
        record.prep_timers[3][1] = 12;
        let text = encode(&mut record, "Pryt", SaveMode::Normal);
        assert_eq!(text, "Pryt:\n3 0 12 0 0 0 0 0\n-1 -1\n");
        let (loaded, report) = decode("Pryt", "Pryt:\n3 0 12 0 0 0 0 0\n5 1 2\n-1 -1\n");
        assert_eq!(loaded.prep_timers[3][1], 12);
        assert_eq!(report.anomalies.len(), 1);
    }

    #[test]
    fn aliases_are_count_prefixed() {
        let mut record = new_record("Aldric");
        record.aliases.push(Alias {
            alias: "kk".to_string(),
            replacement: "kill kobold".to_string(),
            kind: 0,
        });
        let text = encode(&mut record, "Alis", SaveMode::Normal);
        assert_eq!(text, "Alis: 1\n kk\n kill kobold\n0\n");
        let (loaded, report) = decode("Alis", &format!("{}Name: Aldric\n", text));
        assert_eq!(loaded.aliases, record.aliases);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn effects_accept_legacy_shapes() {
        let text = "Affs:\n31 10 2 1 0 0 0 0 3 7\n40 5 1 18 0 0 0 0\n41 5 0 0 3\n0 0 0 0 0 0 0 0 0 0\n";
        let (record, report) = decode("Affs", text);
        assert!(report.anomalies.is_empty());
        let effects = record.effects();
        assert_eq!(effects.len(), 3);
        assert_eq!(effects[0].bonus_type, 3);
        assert_eq!(effects[0].specific, 7);
        assert_eq!(effects[1].location, ApplyLocation::Hitroll.code());
        assert_eq!(effects[2].bitvector, [8, 0, 0, 0]);
    }

    #[test]
    fn damage_reduction_dedupes_spells() {
        let mut record = new_record("Aldric");
        let entry = DamageReduction {
            amount: 5,
            max_damage: 50,
            spell: 31,
            feat: 0,
            bypass: [(1, 2), (0, 0), (0, 0)],
        };
        record.damage_reduction.push(entry);
        record.damage_reduction.push(entry);
        let text = encode(&mut record, "DmgR", SaveMode::Normal);
        assert_eq!(text, "DmgR:\n1 5 50 31 0\n1 2\n0 0\n0 0\n0 0 0 0 0\n");
        let (loaded, report) = decode("DmgR", &text);
        assert_eq!(loaded.damage_reduction, vec![entry]);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn equipment_refuses_duplicate_slots() {
        let text = "Eqpt:\n5 3040 13 12\n5 3041\n99 1\n-1 -1\n";
        let (record, report) = decode("Eqpt", text);
        let body = record.equipment().slot(WearSlot::Body).expect("body");
        assert_eq!(body.vnum, 3040);
        assert_eq!(body.applies, vec![(13, 12)]);
        assert_eq!(record.derived().max_hit, 12);
        assert_eq!(report.anomalies.len(), 2);
    }

    #[test]
    fn missing_sentinel_is_reported() {
        let (record, report) = decode("Feat", "Feat:\n3 1\n");
        assert_eq!(record.feats.get(3), 1);
        assert_eq!(report.anomalies.len(), 1);
    }

    #[test]
    fn positional_lists_drop_trailing_zeros() {
        let mut record = new_record("Aldric");
        record.bombs[0] = 4;
        record.bombs[2] = 7;
        let text = encode(&mut record, "Bomb", SaveMode::Normal);
        assert_eq!(text, "Bomb:\n4\n0\n7\n-1\n");
        let (loaded, report) = decode("Bomb", &text);
        assert!(report.is_clean());
        assert_eq!(loaded.bombs, record.bombs);
        assert_eq!(loaded.bombs.len(), MAX_BOMBS_ALLOWED);
    }

    #[test]
    fn positional_list_replaces_previous_contents() {
        let mut text = String::from("Judg:\n");
        for _ in 0..NUM_INQ_JUDGEMENTS + 2 {
            text.push_str("1\n");
        }
        text.push_str("-1\n");
        let (record, report) = decode("Judg", &text);
        assert_eq!(record.judgements, vec![1; NUM_INQ_JUDGEMENTS]);
        assert_eq!(report.out_of_range_count(), 2);

        let (record, report) = decode("Mrcy", "Mrcy:\n0\n1\n-1\n");
        assert!(report.is_clean());
        assert_eq!(record.mercies[1], 1);
        assert_eq!(record.mercies.len(), NUM_PALADIN_MERCIES);
    }

    #[test]
    fn buff_and_focus_rows_keep_their_width() {
        let mut record = new_record("Aldric");
        record.buffs[2] = [55, 1];
        record.skill_focus[14] = [1, 2];
        assert_eq!(
            encode(&mut record, "Buff", SaveMode::Normal),
            "Buff:\n2 55 1\n-1 -1 -1\n"
        );
        assert_eq!(
            encode(&mut record, "SklF", SaveMode::Normal),
            "SklF:\n14 1 2\n-1 -1 -1\n"
        );
        let (loaded, report) = decode("SklF", "SklF:\n14 1 2 \n3 1\n-1 -1 -1\n");
        assert_eq!(loaded.skill_focus[14], [1, 2]);
        assert_eq!(report.malformed_count(), 1);
        let (_, report) = decode("Buff", "Buff:\n6 1 1\n-1 -1 -1\n");
        assert_eq!(report.out_of_range_count(), 1);
    }

    #[test]
    fn prepared_spell_grids_are_separate_sections() {
        let mut record = new_record("Aldric");
        record.prayed[0][3] = 42;
        record.prayed_metamagic[0][3] = 2;
        assert_eq!(
            encode(&mut record, "Pryd", SaveMode::Normal),
            "Pryd:\n0 0 0 0 42 0 0 0\n-1 -1\n"
        );
        assert_eq!(encode(&mut record, "Pryg", SaveMode::Normal), "Pryg:\n-1 -1\n");
        let (loaded, report) = decode("Prdm", "Prdm:\n0 0 0 0 2 0 0 0\n-1 -1\n");
        assert!(report.is_clean());
        assert_eq!(loaded.prayed_metamagic, record.prayed_metamagic);
    }

    #[test]
    fn collection_and_innate_slots_keep_order() {
        let mut record = new_record("Aldric");
        let slot = |class, spell, domain| SpellSlot {
            class,
            spell,
            metamagic: 0,
            prep_time: 12,
            domain,
        };
        record.spell_collection.extend([slot(0, 30, 0), slot(0, 21, 0)]);
        record.innate_magic.push(slot(3, 2, 7));
        let text = encode(&mut record, "Coll", SaveMode::Normal);
        assert_eq!(text, "Coll:\n0 30 0 12 0\n0 21 0 12 0\n-1 -1 -1 -1 -1\n");
        let (loaded, report) = decode("Coll", &text);
        assert!(report.is_clean());
        assert_eq!(loaded.spell_collection, record.spell_collection);

        let text = "InMa:\n3 2 0 12 7\n3 10 0 12 0\n3 1 0\n-1 -1 -1 -1 -1\n";
        let (loaded, report) = decode("InMa", text);
        assert_eq!(loaded.innate_magic, record.innate_magic);
        assert_eq!(report.out_of_range_count(), 1);
        assert_eq!(report.malformed_count(), 1);
    }

    proptest! {
        #[test]
        fn skill_tables_roundtrip(entries in prop::collection::btree_map(1i32..600, 1i32..=100, 0..40)) {
            let mut record = new_record("Aldric");
            for (skill, value) in &entries {
                record.skills.set(*skill, *value).expect("in range");
            }
            let text = encode(&mut record, "Skil", SaveMode::Normal);
            let (loaded, report) = decode("Skil", &text);
            prop_assert!(report.anomalies.is_empty());
            prop_assert_eq!(loaded.skills, record.skills);
        }
    }
}
