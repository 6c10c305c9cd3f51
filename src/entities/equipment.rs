#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WearSlot {
    Light,
    FingerRight,
    FingerLeft,
    Neck1,
    Neck2,
    Body,
    Head,
    Legs,
    Feet,
    Hands,
    Arms,
    Shield,
    About,
    Waist,
    WristRight,
    WristLeft,
    Wield,
    Held,
    WieldOffhand,
    HeldOffhand,
    WieldTwoHanded,
    HeldTwoHanded,
    Face,
}

pub const NUM_WEARS: usize = 23;

pub const WEAR_SLOTS: [WearSlot; NUM_WEARS] = [
    WearSlot::Light,
    WearSlot::FingerRight,
    WearSlot::FingerLeft,
    WearSlot::Neck1,
    WearSlot::Neck2,
    WearSlot::Body,
    WearSlot::Head,
    WearSlot::Legs,
    WearSlot::Feet,
    WearSlot::Hands,
    WearSlot::Arms,
    WearSlot::Shield,
    WearSlot::About,
    WearSlot::Waist,
    WearSlot::WristRight,
    WearSlot::WristLeft,
    WearSlot::Wield,
    WearSlot::Held,
    WearSlot::WieldOffhand,
    WearSlot::HeldOffhand,
    WearSlot::WieldTwoHanded,
    WearSlot::HeldTwoHanded,
    WearSlot::Face,
];

impl WearSlot {
    pub fn index(self) -> usize {
        match self {
            WearSlot::Light => 0,
            WearSlot::FingerRight => 1,
            WearSlot::FingerLeft => 2,
            WearSlot::Neck1 => 3,
            WearSlot::Neck2 => 4,
            WearSlot::Body => 5,
            WearSlot::Head => 6,
            WearSlot::Legs => 7,
            WearSlot::Feet => 8,
            WearSlot::Hands => 9,
            WearSlot::Arms => 10,
            WearSlot::Shield => 11,
            WearSlot::About => 12,
            WearSlot::Waist => 13,
            WearSlot::WristRight => 14,
            WearSlot::WristLeft => 15,
            WearSlot::Wield => 16,
            WearSlot::Held => 17,
            WearSlot::WieldOffhand => 18,
            WearSlot::HeldOffhand => 19,
            WearSlot::WieldTwoHanded => 20,
            WearSlot::HeldTwoHanded => 21,
            WearSlot::Face => 22,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        WEAR_SLOTS.get(index).copied()
    }
}

/// Reference to a worn object: its prototype vnum and the stat applies it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquippedItem {
    pub vnum: i32,
    pub applies: Vec<(i32, i32)>,
}

impl EquippedItem {
    pub fn new(vnum: i32) -> Self {
        Self {
            vnum,
            applies: Vec::new(),
        }
    }

    pub fn with_apply(mut self, location: i32, modifier: i32) -> Self {
        self.applies.push((location, modifier));
        self
    }
}

/// Slot-indexed equipment, one item per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    slots: Vec<Option<EquippedItem>>,
}

impl Default for Equipment {
    fn default() -> Self {
        Self {
            slots: vec![None; NUM_WEARS],
        }
    }
}

impl Equipment {
    pub fn slot(&self, slot: WearSlot) -> Option<&EquippedItem> {
        self.slots.get(slot.index()).and_then(|entry| entry.as_ref())
    }

    pub fn set_slot(&mut self, slot: WearSlot, item: Option<EquippedItem>) -> Option<EquippedItem> {
        std::mem::replace(&mut self.slots[slot.index()], item)
    }

    pub fn take_slot(&mut self, slot: WearSlot) -> Option<EquippedItem> {
        self.slots[slot.index()].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WearSlot, &EquippedItem)> {
        WEAR_SLOTS
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(slot, entry)| entry.as_ref().map(|item| (*slot, item)))
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }
}
