//! Schedule editing state owned by the caller.
//!
//! A draft holds the days a provider has ticked, each with an ordered list of
//! raw slots (placeholders allowed), plus a cursor on one day and one slot.
//! Every edit consumes the draft and returns the next one.

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::{validate_schedule, EngineError};
use crate::model::*;

/// Bounds of the per-day slot count selector.
pub const MIN_SLOT_COUNT: usize = 1;
pub const MAX_SLOT_COUNT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDraft {
    selected: BTreeSet<Day>,
    /// Slots per day. Kept when a day is unticked so re-ticking restores them.
    slots: BTreeMap<Day, Vec<RawSlot>>,
    current_day: Option<Day>,
    current_slot: Option<usize>,
}

impl ScheduleDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a saved schedule for editing. The cursor lands on the first slot
    /// of the earliest day.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let mut draft = Self::new();
        for (key, slots) in schedule_to_raw(schedule) {
            if let Some(day) = Day::parse(&key) {
                draft.selected.insert(day);
                draft.slots.insert(day, slots);
            }
        }
        let first = draft.selected.iter().next().copied();
        draft.focus(first)
    }

    pub fn selected_days(&self) -> impl Iterator<Item = Day> + '_ {
        self.selected.iter().copied()
    }

    pub fn is_selected(&self, day: Day) -> bool {
        self.selected.contains(&day)
    }

    pub fn current_day(&self) -> Option<Day> {
        self.current_day
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.current_slot
    }

    pub fn slots(&self, day: Day) -> &[RawSlot] {
        self.slots.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn selected_slot(&self) -> Option<&RawSlot> {
        let day = self.current_day?;
        self.slots.get(&day)?.get(self.current_slot?)
    }

    /// Tick or untick a day. Ticking moves the cursor to it; unticking the
    /// focused day moves the cursor to the earliest day still ticked.
    pub fn toggle_day(mut self, day: Day) -> Self {
        if self.selected.remove(&day) {
            if self.current_day == Some(day) {
                let next = self.selected.iter().next().copied();
                return self.focus(next);
            }
            self
        } else {
            self.selected.insert(day);
            self.focus(Some(day))
        }
    }

    /// Move the cursor to an already ticked day. Anything else is ignored.
    pub fn select_day(self, day: Day) -> Self {
        if !self.selected.contains(&day) || self.current_day == Some(day) {
            return self;
        }
        self.focus(Some(day))
    }

    /// Resize the focused day's slot list, padding with placeholders or
    /// dropping from the end. The count is clamped to the selector bounds.
    pub fn set_slot_count(mut self, count: usize) -> Self {
        let Some(day) = self.current_day else {
            return self;
        };
        let count = count.clamp(MIN_SLOT_COUNT, MAX_SLOT_COUNT);
        let slots = self.slots.entry(day).or_default();
        slots.resize_with(count, RawSlot::default);
        if self.current_slot.is_none_or(|i| i >= count) {
            self.current_slot = Some(0);
        }
        self
    }

    /// Move the cursor within the focused day. Out of range is ignored.
    pub fn select_slot(mut self, index: usize) -> Self {
        if self.current_day.is_some_and(|day| index < self.slots(day).len()) {
            self.current_slot = Some(index);
        }
        self
    }

    /// Write start/end text into the slot under the cursor.
    pub fn set_selected_times(mut self, start: &str, end: &str) -> Self {
        if let (Some(day), Some(index)) = (self.current_day, self.current_slot)
            && let Some(slot) = self.slots.get_mut(&day).and_then(|s| s.get_mut(index))
        {
            *slot = RawSlot::new(start.trim(), end.trim());
        }
        self
    }

    /// Ticked days in week order, placeholders included.
    pub fn to_raw(&self) -> RawSchedule {
        self.selected
            .iter()
            .map(|day| (day.abbr().to_string(), self.slots(*day).to_vec()))
            .collect()
    }

    /// Validate the draft into a schedule ready for submission.
    pub fn finish(&self) -> Result<Schedule, EngineError> {
        validate_schedule(&self.to_raw())
    }

    /// Point the cursor at `day`. A day with no slots yet gets one placeholder
    /// so there is always something to type into.
    fn focus(mut self, day: Option<Day>) -> Self {
        self.current_day = day;
        self.current_slot = None;
        if let Some(day) = day {
            let slots = self.slots.entry(day).or_default();
            if slots.is_empty() {
                slots.push(RawSlot::default());
            }
            self.current_slot = Some(0);
        }
        self
    }
}
