//! Matches responses to the requests that are waiting for them.

use std::collections::BTreeMap;

use geckowire_proto::{Command, Dialect, Message};

use crate::error::{Error, Result};

/// Correlation state of one transport session.
///
/// Ids are handed out in increasing order, so the pending map iterates in
/// the order requests were sent.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    /// Last id handed out by [`next_id`](Self::next_id).
    last_id: u64,
    /// Id of the most recently received message.
    last_observed: Option<u64>,
    /// Outstanding request ids and their command names.
    pending: BTreeMap<u64, String>,
}

impl Correlator {
    /// Allocates the next correlation id.
    pub(crate) const fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// Last id handed out, `0` before the first request.
    pub(crate) const fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Id of the most recently received message.
    pub(crate) const fn last_observed_id(&self) -> Option<u64> {
        self.last_observed
    }

    /// Records `cmd` as awaiting a response.
    ///
    /// Commands without an id are not tracked, and neither is anything sent
    /// under a legacy dialect, whose responses carry no id to match.
    pub(crate) fn register(&mut self, cmd: &Command, dialect: Dialect) {
        if dialect.is_legacy() {
            return;
        }
        if let Some(id) = cmd.id {
            self.pending.insert(id, cmd.name.clone());
        }
    }

    /// Accounts for a received message.
    ///
    /// Under dialect 3 and above a response must answer a pending request,
    /// in any order; the request is then no longer pending. Commands are
    /// callbacks from the remote end and are never checked.
    pub(crate) fn observe(&mut self, msg: Message, dialect: Dialect) -> Result<Message> {
        self.last_observed = msg.id();
        let resp = match msg {
            Message::Response(resp) => resp,
            other => return Ok(other),
        };
        if !dialect.is_legacy() {
            match resp.id.and_then(|id| self.pending.remove(&id)) {
                Some(name) => tracing::trace!(id = ?resp.id, %name, "response matched"),
                None => {
                    tracing::warn!(%resp, pending = ?self.pending_ids(), "unexpected response");
                    return Err(Error::UnexpectedResponse(Box::new(resp)));
                }
            }
        }
        Ok(Message::Response(resp))
    }

    /// Returns `true` if `id` is still awaiting a response.
    pub(crate) fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Outstanding ids in the order they were sent.
    pub(crate) fn pending_ids(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    /// Forgets outstanding requests; ids keep increasing.
    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
