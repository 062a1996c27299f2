use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::StatementKind;
use crate::engine::Engine;
use crate::error::SqlCursorError;

/// Default number of compiled statements kept per connection.
pub const DEFAULT_CAPACITY: usize = 100;

/// Counters describing how requests were served by the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// A free cached statement was handed out.
    pub hits: u64,
    /// The SQL text had no entry and was compiled into a new one.
    pub misses: u64,
    /// An entry was dropped to make room.
    pub evictions: u64,
    /// The entry was checked out, so a one-shot statement was compiled instead.
    pub bypasses: u64,
}

enum SlotState<S> {
    Free(S),
    CheckedOut,
}

struct Slot<S> {
    key: Arc<str>,
    state: SlotState<S>,
    kind: StatementKind,
    last_used: u64,
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Cached { key: Arc<str>, id: u64 },
    OneShot,
}

/// A compiled statement lent out of the cache for the duration of one execution.
///
/// It must be handed back through [`StatementCache::checkin`], which resets it and either
/// returns it to its slot or finalizes it.
pub struct CheckedOut<S> {
    stmt: S,
    origin: Origin,
    kind: StatementKind,
}

impl<S> CheckedOut<S> {
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Whether this statement belongs to a cache slot (as opposed to a one-shot copy).
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self.origin, Origin::Cached { .. })
    }

    pub(crate) fn statement(&self) -> &S {
        &self.stmt
    }

    pub(crate) fn statement_mut(&mut self) -> &mut S {
        &mut self.stmt
    }

    /// Swap in a recompiled statement, returning the stale one for finalization.
    pub(crate) fn replace_statement(&mut self, stmt: S) -> S {
        std::mem::replace(&mut self.stmt, stmt)
    }
}

/// LRU cache of compiled statements keyed by exact SQL text.
///
/// Each slot is either `Free` (holding its statement) or `CheckedOut` (the statement is lent
/// to a cursor). A request for a checked-out text never touches the lent statement; it gets
/// a one-shot copy that is finalized on checkin.
pub struct StatementCache<S> {
    capacity: usize,
    slots: HashMap<Arc<str>, Slot<S>>,
    clock: u64,
    next_id: u64,
    stats: CacheStats,
}

impl<S> StatementCache<S> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: HashMap::with_capacity(capacity),
            clock: 0,
            next_id: 0,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn contains(&self, sql: &str) -> bool {
        self.slots.contains_key(sql)
    }

    #[must_use]
    pub fn is_checked_out(&self, sql: &str) -> bool {
        self.slots
            .get(sql)
            .is_some_and(|slot| matches!(slot.state, SlotState::CheckedOut))
    }

    /// Kind of `sql`, taken from its cache entry when one exists.
    #[must_use]
    pub fn kind_of(&self, sql: &str) -> StatementKind {
        self.slots
            .get(sql)
            .map_or_else(|| StatementKind::classify(sql), |slot| slot.kind)
    }

    /// Lend out a statement for `sql`, compiling it if needed.
    ///
    /// # Errors
    /// Returns `SqlCursorError::OperationalError` with the engine diagnostic if compilation
    /// fails; nothing is cached in that case.
    pub fn checkout<E>(&mut self, engine: &mut E, sql: &str) -> Result<CheckedOut<S>, SqlCursorError>
    where
        E: Engine<Statement = S>,
    {
        self.clock += 1;
        let now = self.clock;

        if let Some(slot) = self.slots.get_mut(sql) {
            match std::mem::replace(&mut slot.state, SlotState::CheckedOut) {
                SlotState::Free(mut stmt) => {
                    slot.last_used = now;
                    self.stats.hits += 1;
                    // Free slots are reset on checkin; this only clears stale bindings.
                    engine.clear_bindings(&mut stmt);
                    debug!(sql, "statement cache hit");
                    return Ok(CheckedOut {
                        stmt,
                        origin: Origin::Cached {
                            key: Arc::clone(&slot.key),
                            id: slot.id,
                        },
                        kind: slot.kind,
                    });
                }
                SlotState::CheckedOut => {
                    let kind = slot.kind;
                    self.stats.bypasses += 1;
                    debug!(sql, "cached statement in use; compiling a one-shot copy");
                    let stmt = engine.prepare(sql)?;
                    return Ok(CheckedOut {
                        stmt,
                        origin: Origin::OneShot,
                        kind,
                    });
                }
            }
        }

        self.stats.misses += 1;
        let kind = StatementKind::classify(sql);
        let stmt = engine.prepare(sql)?;
        if self.capacity == 0 {
            return Ok(CheckedOut {
                stmt,
                origin: Origin::OneShot,
                kind,
            });
        }
        while self.slots.len() >= self.capacity {
            if !self.evict_lru(engine) {
                break;
            }
        }

        let key: Arc<str> = Arc::from(sql);
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            Arc::clone(&key),
            Slot {
                key: Arc::clone(&key),
                state: SlotState::CheckedOut,
                kind,
                last_used: now,
                id,
            },
        );
        debug!(sql, cached = self.slots.len(), "statement cache miss");
        Ok(CheckedOut {
            stmt,
            origin: Origin::Cached { key, id },
            kind,
        })
    }

    /// Return a lent statement: reset it, then park it in its slot or finalize it.
    pub fn checkin<E>(&mut self, engine: &mut E, checked: CheckedOut<S>)
    where
        E: Engine<Statement = S>,
    {
        let CheckedOut {
            mut stmt, origin, ..
        } = checked;
        if let Err(err) = engine.reset(&mut stmt) {
            debug!(error = %err, "reset reported the last step failure");
        }
        engine.clear_bindings(&mut stmt);

        match origin {
            Origin::Cached { key, id } => match self.slots.get_mut(key.as_ref()) {
                Some(slot) if slot.id == id && matches!(slot.state, SlotState::CheckedOut) => {
                    slot.state = SlotState::Free(stmt);
                }
                // evicted (and possibly re-added) while lent out
                _ => engine.finalize(stmt),
            },
            Origin::OneShot => engine.finalize(stmt),
        }
    }

    /// Finalize every parked statement and forget all slots. Statements still lent out are
    /// finalized when they are checked back in.
    pub fn clear<E>(&mut self, engine: &mut E)
    where
        E: Engine<Statement = S>,
    {
        for (_, slot) in self.slots.drain() {
            if let SlotState::Free(stmt) = slot.state {
                engine.finalize(stmt);
            }
        }
    }

    fn evict_lru<E>(&mut self, engine: &mut E) -> bool
    where
        E: Engine<Statement = S>,
    {
        let Some(victim) = self
            .slots
            .values()
            .min_by_key(|slot| slot.last_used)
            .map(|slot| Arc::clone(&slot.key))
        else {
            return false;
        };
        if let Some(slot) = self.slots.remove(victim.as_ref()) {
            self.stats.evictions += 1;
            debug!(sql = %victim, "evicting least recently used statement");
            if let SlotState::Free(stmt) = slot.state {
                engine.finalize(stmt);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SqliteEngine, SqliteStatement, StepResult};

    fn engine() -> SqliteEngine {
        SqliteEngine::open(":memory:").unwrap()
    }

    #[test]
    fn second_checkout_of_free_entry_is_a_hit() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(4);
        let first = cache.checkout(&mut engine, "SELECT 1").unwrap();
        assert!(first.is_cached());
        assert!(cache.is_checked_out("SELECT 1"));
        cache.checkin(&mut engine, first);
        assert!(!cache.is_checked_out("SELECT 1"));

        let again = cache.checkout(&mut engine, "SELECT 1").unwrap();
        assert!(again.is_cached());
        cache.checkin(&mut engine, again);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0,
                bypasses: 0
            }
        );
    }

    #[test]
    fn checked_out_entry_is_bypassed_with_one_shot_copy() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(4);
        let mut held = cache.checkout(&mut engine, "SELECT 1").unwrap();
        assert_eq!(engine.step(held.statement_mut()), StepResult::Row);

        let copy = cache.checkout(&mut engine, "SELECT 1").unwrap();
        assert!(!copy.is_cached());
        assert_eq!(cache.stats().bypasses, 1);
        cache.checkin(&mut engine, copy);
        // the lent statement's slot is untouched by the one-shot checkin
        assert!(cache.is_checked_out("SELECT 1"));
        cache.checkin(&mut engine, held);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(2);
        for sql in ["SELECT 1", "SELECT 2"] {
            let s = cache.checkout(&mut engine, sql).unwrap();
            cache.checkin(&mut engine, s);
        }
        let s = cache.checkout(&mut engine, "SELECT 1").unwrap();
        cache.checkin(&mut engine, s);

        let s = cache.checkout(&mut engine, "SELECT 3").unwrap();
        cache.checkin(&mut engine, s);
        assert!(cache.contains("SELECT 1"));
        assert!(!cache.contains("SELECT 2"));
        assert!(cache.contains("SELECT 3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn statement_evicted_while_lent_is_finalized_on_checkin() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(1);
        let held = cache.checkout(&mut engine, "SELECT 1").unwrap();
        let other = cache.checkout(&mut engine, "SELECT 2").unwrap();
        assert!(!cache.contains("SELECT 1"));
        cache.checkin(&mut engine, held);
        assert!(!cache.contains("SELECT 1"));
        cache.checkin(&mut engine, other);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn compile_failure_leaves_no_entry() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(4);
        let err = cache.checkout(&mut engine, "SELEKT 1").err();
        assert!(matches!(err, Some(SqlCursorError::OperationalError(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn kind_comes_from_the_entry() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(4);
        let s = cache.checkout(&mut engine, "select 1").unwrap();
        assert_eq!(s.kind(), StatementKind::Select);
        cache.checkin(&mut engine, s);
        assert_eq!(cache.kind_of("select 1"), StatementKind::Select);
        assert_eq!(cache.kind_of("delete from x"), StatementKind::Delete);
    }

    #[test]
    fn zero_capacity_never_caches() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(0);
        let s = cache.checkout(&mut engine, "SELECT 1").unwrap();
        assert!(!s.is_cached());
        cache.checkin(&mut engine, s);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_finalizes_parked_statements() {
        let mut engine = engine();
        let mut cache: StatementCache<SqliteStatement> = StatementCache::new(4);
        let s = cache.checkout(&mut engine, "SELECT 1").unwrap();
        cache.checkin(&mut engine, s);
        cache.clear(&mut engine);
        assert!(cache.is_empty());
    }
}
