//! Detach/reattach of worn items and timed effects around a save.
//!
//! The live record is written with every bonus stripped so that the file
//! holds true base values. [`SnapshotGuard`] owns the detached state and puts
//! it back when dropped, so an early return or error inside the write step
//! still leaves the record as it was.

use crate::entities::effects::{ActiveEffect, DamageReduction, MAX_AFFECT};
use crate::entities::equipment::{EquippedItem, WearSlot, NUM_WEARS, WEAR_SLOTS};
use crate::entities::player::PlayerRecord;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unsavable {
    #[error("record belongs to a non-player")]
    NotAPlayer,
    #[error("record is mid-transformation")]
    Transforming,
    #[error("record has no index registration")]
    NotIndexed,
}

pub fn check_savable(record: &PlayerRecord) -> Result<(), Unsavable> {
    if record.is_npc {
        return Err(Unsavable::NotAPlayer);
    }
    if record.transforming {
        return Err(Unsavable::Transforming);
    }
    Ok(())
}

/// State held out of the live record while it is being written.
#[derive(Debug, Clone, Default)]
pub struct Held {
    equipment: Vec<Option<EquippedItem>>,
    effects: Vec<ActiveEffect>,
    damage_reduction: Vec<DamageReduction>,
}

impl Held {
    /// Worn items in slot order.
    pub fn equipment(&self) -> impl Iterator<Item = (WearSlot, &EquippedItem)> {
        WEAR_SLOTS
            .iter()
            .zip(self.equipment.iter())
            .filter_map(|(slot, item)| item.as_ref().map(|item| (*slot, item)))
    }

    /// Effects that fit the on-disk store.
    pub fn effects(&self) -> &[ActiveEffect] {
        &self.effects[..self.effects.len().min(MAX_AFFECT)]
    }

    pub fn damage_reduction(&self) -> &[DamageReduction] {
        &self.damage_reduction
    }
}

pub struct SnapshotGuard<'a> {
    record: &'a mut PlayerRecord,
    held: Held,
}

impl<'a> SnapshotGuard<'a> {
    pub fn take(record: &'a mut PlayerRecord) -> Self {
        let mut equipment = vec![None; NUM_WEARS];
        for slot in WEAR_SLOTS {
            equipment[slot.index()] = record.unequip(slot);
        }

        let effects = record.detach_effects();
        if effects.len() > MAX_AFFECT {
            warn!(
                player = %record.name,
                effects = effects.len(),
                "effect store full, {} entries will not be written",
                effects.len() - MAX_AFFECT
            );
        }
        let damage_reduction = record.damage_reduction.clone();
        record
            .damage_reduction
            .retain(|entry| !entry.is_effect_linked());
        record.recompute_derived();

        Self {
            record,
            held: Held {
                equipment,
                effects,
                damage_reduction,
            },
        }
    }

    pub fn record(&self) -> &PlayerRecord {
        self.record
    }

    pub fn held(&self) -> &Held {
        &self.held
    }

    fn restore(&mut self) {
        let held = std::mem::take(&mut self.held);
        self.record.damage_reduction = held.damage_reduction;
        self.record.attach_effects(held.effects);
        for (slot, item) in WEAR_SLOTS.into_iter().zip(held.equipment) {
            if let Some(item) = item {
                self.record.equip(slot, item);
            }
        }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Runs `write` against the stripped record and the held state, restoring
/// the record afterwards on every path.
pub fn with_snapshot<T>(
    record: &mut PlayerRecord,
    write: impl FnOnce(&PlayerRecord, &Held) -> T,
) -> T {
    let guard = SnapshotGuard::take(record);
    write(guard.record(), guard.held())
}
