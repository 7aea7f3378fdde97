//! Ticket information structures.

use super::metadata::TicketRecord;

/// Information about a ticket found in storage.
#[derive(Debug, Clone)]
pub struct TicketInfo {
    /// The storage key holding the ticket.
    pub key: String,

    /// The ticket record.
    pub record: TicketRecord,

    /// Whether the identity's entering flag is also present.
    pub entering: bool,

    /// Whether the ticket has gone unrefreshed for longer than the stale threshold.
    pub is_stale: bool,
}

impl TicketInfo {
    /// The identity holding the ticket.
    pub fn identity(&self) -> &str {
        &self.record.identity
    }
}

impl std::fmt::Display for TicketInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} (owner: {}, age: {}{}{})",
            self.record.number,
            self.record.identity,
            self.record.owner,
            self.record.age_string(),
            if self.entering { ", ENTERING" } else { "" },
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
