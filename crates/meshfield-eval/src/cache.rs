//! Bounded evaluation caches
//!
//! A [`FieldEvaluationCache`] keeps [`ElementFieldEvaluation`] objects for
//! one field, keyed by time within a small most-recently-used slot set and
//! then by element within a capacity-bounded map. Staleness against the
//! field's stored parameters is detected lazily through the field's change
//! stamp on every lookup, never by notification.
//!
//! Caches are explicit values owned by the caller; evaluating the same
//! field from several threads requires independent caches.

use crate::error::EvalError;
use crate::evaluation::{Calculated, ElementFieldEvaluation, EvalContext};
use log::debug;
use meshfield_field::FieldHandle;
use meshfield_types::ElementId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a cached evaluation
pub type EvaluationHandle = Rc<RefCell<ElementFieldEvaluation>>;

/// Cache bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of time-keyed sub-caches kept in most-recently-used order
    pub time_slots: usize,
    /// Element entries per sub-cache before it is cleared in bulk
    pub element_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            time_slots: 3,
            element_capacity: 1000,
        }
    }
}

struct TimeSlot {
    time: f64,
    entries: HashMap<ElementId, EvaluationHandle>,
}

/// Per-field cache of element field evaluations
pub struct FieldEvaluationCache {
    field: FieldHandle,
    config: CacheConfig,
    /// Most-recently-used first
    slots: Vec<TimeSlot>,
    last_change_count: u64,
}

impl FieldEvaluationCache {
    pub fn new(field: FieldHandle) -> Self {
        FieldEvaluationCache::with_config(field, CacheConfig::default())
    }

    pub fn with_config(field: FieldHandle, config: CacheConfig) -> Self {
        let last_change_count = field.borrow().change_count();
        FieldEvaluationCache {
            field,
            config,
            slots: Vec::new(),
            last_change_count,
        }
    }

    pub fn field(&self) -> &FieldHandle {
        &self.field
    }

    /// Number of cached entries at a time, for diagnostics and tests
    pub fn entry_count(&self, time: f64) -> usize {
        self.slots
            .iter()
            .find(|slot| slot.time.to_bits() == time.to_bits())
            .map_or(0, |slot| slot.entries.len())
    }

    /// Drop every cached evaluation
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Get the evaluation for `(element, time)`, reusing a cached object
    /// when it is still current and recalculating otherwise.
    ///
    /// Returns `Ok(None)` when the field has no definition reachable from
    /// the element. Failed calculations are dropped from the cache, not
    /// kept.
    pub fn evaluation(
        &mut self,
        element: ElementId,
        time: f64,
        top_level: Option<ElementId>,
        ctx: &EvalContext<'_>,
    ) -> Result<Option<EvaluationHandle>, EvalError> {
        // lazy staleness: compare the field's change stamp on every lookup
        let change_count = self.field.borrow().change_count();
        if change_count != self.last_change_count {
            debug!(
                "field {} changed, invalidating its evaluation cache",
                self.field.borrow().name()
            );
            self.slots.clear();
            self.last_change_count = change_count;
        }

        let slot = self.promote_slot(time);
        if let Some(existing) = self.slots[slot].entries.get(&element) {
            let handle = Rc::clone(existing);
            let usable = {
                let held = handle.borrow();
                held.is_current(&self.field, element, time)
                    && top_level.map_or(true, |wanted| held.ancestor() == Some(wanted))
            };
            if usable {
                return Ok(Some(handle));
            }
            // stale entry: recalculate in place below
        }

        let handle = self.slots[slot]
            .entries
            .get(&element)
            .cloned()
            .unwrap_or_else(|| Rc::new(RefCell::new(ElementFieldEvaluation::new())));
        let outcome =
            handle
                .borrow_mut()
                .calculate(&self.field, element, time, top_level, ctx);
        match outcome {
            Ok(Calculated::Done) => {
                let entries = &mut self.slots[slot].entries;
                if !entries.contains_key(&element)
                    && entries.len() >= self.config.element_capacity
                {
                    // bulk clear, sparing only the evaluation in use
                    debug!(
                        "evaluation cache for field {} at time {} exceeded {} elements, clearing",
                        self.field.borrow().name(),
                        time,
                        self.config.element_capacity
                    );
                    entries.clear();
                }
                entries.insert(element, Rc::clone(&handle));
                Ok(Some(handle))
            }
            Ok(Calculated::NotDefined) => {
                self.slots[slot].entries.remove(&element);
                Ok(None)
            }
            Err(error) => {
                self.slots[slot].entries.remove(&element);
                Err(error)
            }
        }
    }

    /// Find or create the sub-cache for a time and move it to the front
    /// of the most-recently-used order, evicting the least-recently-used
    /// slot when full
    fn promote_slot(&mut self, time: f64) -> usize {
        if let Some(position) = self
            .slots
            .iter()
            .position(|slot| slot.time.to_bits() == time.to_bits())
        {
            let slot = self.slots.remove(position);
            self.slots.insert(0, slot);
            return 0;
        }
        if self.slots.len() >= self.config.time_slots {
            let evicted = self.slots.pop().expect("slot set is non-empty");
            debug!(
                "evicting evaluation cache slot for time {} of field {}",
                evicted.time,
                self.field.borrow().name()
            );
        }
        self.slots.insert(
            0,
            TimeSlot {
                time,
                entries: HashMap::new(),
            },
        );
        0
    }
}
