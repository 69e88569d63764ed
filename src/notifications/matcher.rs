//! Subscription matching: which followers of an activity's streams opted in.

use crate::activities::Activity;
use crate::error::Result;
use crate::repo::RepoTx;
use crate::streams::Stream;
use crate::types::SubscriberId;
use std::collections::HashSet;

/// Default cap on (stream, follower) pairs examined per activity.
pub const DEFAULT_MAX_FANOUT: usize = 10_000;

/// A follower with a subscription for the activity's signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub subscriber: SubscriberId,
    pub send_email: bool,
}

#[derive(Clone, Debug)]
pub struct SubscriptionMatcher {
    max_fanout: usize,
}

impl SubscriptionMatcher {
    pub fn new(max_fanout: usize) -> Self {
        Self { max_fanout }
    }

    /// Load the streams an activity is currently attached to.
    pub fn streams_of<T: RepoTx + ?Sized>(&self, tx: &mut T, activity: &Activity) -> Result<Vec<Stream>> {
        let mut streams = Vec::with_capacity(activity.streams.len());
        for id in &activity.streams {
            if let Some(stream) = tx.stream(*id)? {
                streams.push(stream);
            }
        }
        Ok(streams)
    }

    /// Followers of `streams` subscribed to the activity's signature.
    ///
    /// Opt-in: followers without a subscription are skipped. A follower
    /// reached through several streams is returned once, in first-seen
    /// order. Work stops once `max_fanout` pairs have been examined.
    pub fn match_followers<T: RepoTx + ?Sized>(
        &self,
        tx: &mut T,
        activity: &Activity,
        streams: &[Stream],
    ) -> Result<Vec<Match>> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        let mut examined = 0usize;

        'streams: for stream in streams {
            for &follower in &stream.followers {
                if examined == self.max_fanout {
                    tracing::warn!(
                        activity = %activity.id,
                        signature = %activity.signature,
                        max_fanout = self.max_fanout,
                        "fan-out cap reached, remaining followers skipped"
                    );
                    break 'streams;
                }
                examined += 1;

                if !seen.insert(follower) {
                    continue;
                }
                if let Some(subscription) = tx.subscription(follower, &activity.signature)? {
                    matches.push(Match {
                        subscriber: follower,
                        send_email: subscription.send_email,
                    });
                }
            }
        }

        Ok(matches)
    }
}

impl Default for SubscriptionMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FANOUT)
    }
}
