//! Activity creation and stream attachment.

use super::collector;
use super::types::{Activity, ActivityDraft};
use crate::error::{EngineError, Result};
use crate::repo::RepoTx;
use crate::types::{ActivityId, StreamId};
use std::collections::BTreeSet;

/// How far an activity spreads beyond the streams it is recorded on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    /// Attach to the target streams only.
    None,
    /// Also attach to the streams linked from each target, one hop.
    Linked,
}

/// Append-only log of activities.
#[derive(Clone, Debug, Default)]
pub struct ActivityLog;

impl ActivityLog {
    pub fn new() -> Self {
        Self
    }

    /// Create an activity and attach it to `targets`.
    ///
    /// Duplicate and missing targets are skipped. With
    /// [`Propagation::Linked`] the activity is forwarded to the streams
    /// linked from each target, but not beyond. An activity that ends up on
    /// no stream is collected at once; the returned copy still describes it.
    pub fn record<T: RepoTx + ?Sized>(
        &self,
        tx: &mut T,
        draft: ActivityDraft,
        targets: &[StreamId],
        propagation: Propagation,
    ) -> Result<Activity> {
        let id = tx.insert_activity(draft)?.id;

        let mut seen = BTreeSet::new();
        let mut direct = Vec::with_capacity(targets.len());
        for &stream_id in targets {
            if !seen.insert(stream_id) {
                continue;
            }
            match tx.stream(stream_id)? {
                Some(stream) => {
                    tx.attach(id, stream_id)?;
                    direct.push(stream);
                }
                None => tracing::warn!(activity = %id, stream = %stream_id, "target stream missing"),
            }
        }

        if propagation == Propagation::Linked {
            for stream in &direct {
                for &linked in &stream.linked {
                    if seen.insert(linked) && tx.stream(linked)?.is_some() {
                        tx.attach(id, linked)?;
                    }
                }
            }
        }

        let activity = tx.activity(id)?.ok_or(EngineError::ActivityNotFound(id))?;

        tracing::debug!(
            activity = %id,
            signature = %activity.signature,
            streams = activity.streams.len(),
            "activity recorded"
        );

        if activity.is_orphaned() {
            collector::collect_orphan(tx, id)?;
        }

        Ok(activity)
    }

    /// Attach an existing activity to one more stream, forwarding it to the
    /// streams linked from that stream, one hop.
    ///
    /// Returns the updated activity and whether anything was attached.
    pub fn attach<T: RepoTx + ?Sized>(
        &self,
        tx: &mut T,
        activity: ActivityId,
        stream: StreamId,
    ) -> Result<(Activity, bool)> {
        if tx.activity(activity)?.is_none() {
            return Err(EngineError::ActivityNotFound(activity));
        }
        let target = tx.stream(stream)?.ok_or(EngineError::StreamNotFound(stream))?;

        let mut added = tx.attach(activity, stream)?;
        for &linked in &target.linked {
            if linked != stream && tx.stream(linked)?.is_some() {
                added |= tx.attach(activity, linked)?;
            }
        }

        let activity = tx.activity(activity)?.ok_or(EngineError::ActivityNotFound(activity))?;
        tracing::debug!(activity = %activity.id, stream = %stream, added, "activity attached");
        Ok((activity, added))
    }
}
