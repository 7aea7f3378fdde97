//! Cross-process bakery ticket protocol.
//!
//! One acquisition attempt moves through
//! `VerifyingStorage -> ComputingTicket -> Waiting -> Holding`:
//!
//! 1. Probe the storage ([`health::verify_storage`]).
//! 2. Raise the entering flag, draw `1 + max(visible tickets)`, persist the
//!    ticket, lower the flag.
//! 3. Poll until no other identity blocks us. An identity blocks while its
//!    entering flag is raised or while its ticket sorts before ours.
//!
//! Every poll rewrites our own ticket (the heartbeat) and reads it back, so a
//! backend that stops persisting is noticed within one interval.
//!
//! A blocker whose records have not changed for longer than the timeout is
//! presumed crashed and force-cleared. Waiters heartbeat, holders do not, so
//! only holders (or identities that died mid-protocol) are ever taken over.
//! Two waiters that clear the same stale holder simply re-evaluate: the lower
//! ticket wins and the other keeps waiting on it with a fresh measurement.

use super::guard::TicketGuard;
use super::health;
use super::keys::LockKeys;
use super::metadata::{EnteringRecord, TicketRecord};
use super::operations::{load_entering, load_ticket};
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::storage::Storage;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Acquire the lock for `identity`, returning once it is held.
pub(crate) async fn acquire(
    storage: Arc<dyn Storage>,
    keys: &LockKeys,
    identity: &str,
    config: &LockConfig,
) -> Result<TicketGuard> {
    health::verify_storage(storage.as_ref(), keys, identity)?;

    // Anything written from here on is removed again if the attempt fails.
    let guard = TicketGuard::new(storage.clone(), keys, identity);

    let mut ticket = draw_ticket(storage.as_ref(), keys, identity)?;
    debug!(
        lock = keys.lock(),
        identity,
        number = ticket.number,
        "drew ticket"
    );

    wait_for_turn(storage.as_ref(), keys, &mut ticket, config).await?;

    Ok(guard)
}

/// Steps 1-3 of the bakery: choose a number one above everything visible.
fn draw_ticket(storage: &dyn Storage, keys: &LockKeys, identity: &str) -> Result<TicketRecord> {
    let entering_key = keys.entering(identity);
    let entering = EnteringRecord::new(keys.lock(), identity).to_json()?;
    storage
        .set(&entering_key, &entering)
        .map_err(LockError::dropped)?;

    let highest = scan_contenders(storage, keys, identity)?
        .values()
        .filter_map(|c| c.ticket.as_ref().map(|t| t.number))
        .max()
        .unwrap_or(0);

    let number = highest.checked_add(1).ok_or_else(|| {
        LockError::StorageDropped(format!(
            "ticket numbers for '{}' are exhausted",
            keys.lock()
        ))
    })?;

    let ticket = TicketRecord::new(keys.lock(), identity, number);
    storage
        .set(&keys.ticket(identity), &ticket.to_json()?)
        .map_err(LockError::dropped)?;
    storage.remove(&entering_key).map_err(LockError::dropped)?;

    Ok(ticket)
}

/// Steps 4-6: poll until nothing sorts before us.
async fn wait_for_turn(
    storage: &dyn Storage,
    keys: &LockKeys,
    ticket: &mut TicketRecord,
    config: &LockConfig,
) -> Result<()> {
    let ticket_key = keys.ticket(&ticket.identity);
    let started = Instant::now();
    let mut watch = BlockerWatch::default();

    loop {
        health::refresh_ticket(storage, &ticket_key, ticket)?;

        let contenders = scan_contenders(storage, keys, &ticket.identity)?;
        let blockers: Vec<&Contender> = contenders
            .values()
            .filter(|c| c.blocks(ticket))
            .collect();
        watch.retain(&blockers);

        let now = Instant::now();
        let mut blocked = false;
        for blocker in blockers {
            let blocked_for = watch.observe(blocker, now);
            if blocked_for > config.timeout() {
                warn!(
                    lock = keys.lock(),
                    identity = %ticket.identity,
                    stale = %blocker.identity,
                    blocked_ms = blocked_for.as_millis() as u64,
                    "taking over from unresponsive ticket holder"
                );
                force_clear(storage, keys, &blocker.identity)?;
                watch.forget(&blocker.identity);
            } else {
                blocked = true;
            }
        }

        if !blocked {
            debug!(
                lock = keys.lock(),
                identity = %ticket.identity,
                waited_ms = started.elapsed().as_millis() as u64,
                "lock acquired"
            );
            return Ok(());
        }

        sleep(config.poll_interval()).await;
    }
}

/// Remove a presumed-crashed identity's ticket and entering flag.
fn force_clear(storage: &dyn Storage, keys: &LockKeys, identity: &str) -> Result<()> {
    storage
        .remove(&keys.entering(identity))
        .map_err(LockError::dropped)?;
    storage
        .remove(&keys.ticket(identity))
        .map_err(LockError::dropped)
}

/// Another identity's visible records.
#[derive(Debug, Default)]
struct Contender {
    identity: String,
    entering: Option<String>,
    ticket_raw: Option<String>,
    ticket: Option<TicketRecord>,
}

impl Contender {
    fn blocks(&self, mine: &TicketRecord) -> bool {
        self.entering.is_some() || self.ticket.as_ref().is_some_and(|t| t.precedes(mine))
    }

    /// Changes whenever the contender rewrites any of its records.
    fn fingerprint(&self) -> String {
        format!(
            "{}|{}",
            self.entering.as_deref().unwrap_or(""),
            self.ticket_raw.as_deref().unwrap_or("")
        )
    }
}

/// Collect every other identity's entering flag and ticket.
fn scan_contenders(
    storage: &dyn Storage,
    keys: &LockKeys,
    me: &str,
) -> Result<BTreeMap<String, Contender>> {
    let mut contenders: BTreeMap<String, Contender> = BTreeMap::new();

    for key in storage
        .keys(&keys.entering_prefix())
        .map_err(LockError::dropped)?
    {
        if let Some((raw, record)) = load_entering(storage, keys, &key).map_err(LockError::dropped)?
            && record.identity != me
        {
            contender(&mut contenders, &record.identity).entering = Some(raw);
        }
    }

    for key in storage
        .keys(&keys.ticket_prefix())
        .map_err(LockError::dropped)?
    {
        if let Some((raw, record)) = load_ticket(storage, keys, &key).map_err(LockError::dropped)?
            && record.identity != me
        {
            let entry = contender(&mut contenders, &record.identity);
            entry.ticket_raw = Some(raw);
            entry.ticket = Some(record);
        }
    }

    Ok(contenders)
}

fn contender<'a>(contenders: &'a mut BTreeMap<String, Contender>, identity: &str) -> &'a mut Contender {
    contenders
        .entry(identity.to_string())
        .or_insert_with(|| Contender {
            identity: identity.to_string(),
            ..Contender::default()
        })
}

/// Tracks how long each blocker has gone without changing its records.
#[derive(Debug, Default)]
struct BlockerWatch {
    seen: HashMap<String, Sighting>,
}

#[derive(Debug)]
struct Sighting {
    fingerprint: String,
    since: Instant,
}

impl BlockerWatch {
    /// Record a sighting and return how long the blocker has been unchanged.
    fn observe(&mut self, blocker: &Contender, now: Instant) -> Duration {
        let fingerprint = blocker.fingerprint();
        let sighting = self
            .seen
            .entry(blocker.identity.clone())
            .or_insert_with(|| Sighting {
                fingerprint: fingerprint.clone(),
                since: now,
            });

        if sighting.fingerprint != fingerprint {
            sighting.fingerprint = fingerprint;
            sighting.since = now;
        }

        now.duration_since(sighting.since)
    }

    /// Drop identities that no longer block.
    fn retain(&mut self, blockers: &[&Contender]) {
        self.seen
            .retain(|identity, _| blockers.iter().any(|b| &b.identity == identity));
    }

    fn forget(&mut self, identity: &str) {
        self.seen.remove(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contender(identity: &str, number: Option<u64>, entering: bool) -> Contender {
        let ticket = number.map(|n| TicketRecord::new("k", identity, n));
        Contender {
            identity: identity.to_string(),
            entering: entering.then(|| "{}".to_string()),
            ticket_raw: ticket.as_ref().map(|t| t.to_json().unwrap()),
            ticket,
        }
    }

    #[test]
    fn lower_number_blocks() {
        let mine = TicketRecord::new("k", "b", 5);
        assert!(contender("z", Some(4), false).blocks(&mine));
        assert!(!contender("a", Some(6), false).blocks(&mine));
    }

    #[test]
    fn identity_breaks_ties() {
        let mine = TicketRecord::new("k", "b", 5);
        assert!(contender("a", Some(5), false).blocks(&mine));
        assert!(!contender("c", Some(5), false).blocks(&mine));
    }

    #[test]
    fn entering_flag_blocks_regardless_of_ticket() {
        let mine = TicketRecord::new("k", "b", 1);
        assert!(contender("z", None, true).blocks(&mine));
        assert!(contender("z", Some(9), true).blocks(&mine));
        assert!(!contender("z", None, false).blocks(&mine));
    }

    #[test]
    fn watch_measures_from_first_sighting() {
        let mut watch = BlockerWatch::default();
        let blocker = contender("a", Some(1), false);
        let t0 = Instant::now();

        assert_eq!(watch.observe(&blocker, t0), Duration::ZERO);
        assert_eq!(
            watch.observe(&blocker, t0 + Duration::from_millis(700)),
            Duration::from_millis(700)
        );
    }

    #[test]
    fn watch_resets_when_records_change() {
        let mut watch = BlockerWatch::default();
        let mut blocker = contender("a", Some(1), false);
        let t0 = Instant::now();

        watch.observe(&blocker, t0);

        let mut record = blocker.ticket.clone().unwrap();
        record.bump();
        blocker.ticket_raw = Some(record.to_json().unwrap());
        blocker.ticket = Some(record);

        let t1 = t0 + Duration::from_millis(900);
        assert_eq!(watch.observe(&blocker, t1), Duration::ZERO);
        assert_eq!(
            watch.observe(&blocker, t1 + Duration::from_millis(50)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn watch_forgets_identities_that_stop_blocking() {
        let mut watch = BlockerWatch::default();
        let a = contender("a", Some(1), false);
        let b = contender("b", Some(2), false);
        let t0 = Instant::now();

        watch.observe(&a, t0);
        watch.observe(&b, t0);
        watch.retain(&[&b]);

        assert!(!watch.seen.contains_key("a"));
        assert!(watch.seen.contains_key("b"));
    }
}
