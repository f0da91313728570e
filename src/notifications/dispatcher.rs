//! Fan-out of rendered messages to subscriptions

use std::sync::Arc;

use futures::future::join_all;

use super::channels::DestinationClient;
use super::RenderedMessage;
use crate::metrics;
use crate::models::{ContentItem, ItemKind, Subscription};

/// Per-item delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Skipped by subscription options
    pub filtered: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.filtered + self.unresolved + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Unresolved,
    Failed,
}

/// Delivers one rendered message to every matching subscription
pub struct Dispatcher {
    client: Arc<dyn DestinationClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn DestinationClient>) -> Self {
        Self { client }
    }

    /// Whether the subscription's options admit `item`
    pub fn accepts(subscription: &Subscription, item: &ContentItem) -> bool {
        if item.kind() == ItemKind::Story && !subscription.options.stories {
            return false;
        }
        if item.sub_brand().is_some() && !subscription.options.sub_brand {
            return false;
        }
        true
    }

    /// Deliver `message` to every subscription of the item's source
    ///
    /// Deliveries run concurrently; one failing destination never affects
    /// the others.
    pub async fn dispatch(
        &self,
        item: &ContentItem,
        message: &RenderedMessage,
        subscriptions: &[Subscription],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut deliveries = Vec::new();

        for subscription in subscriptions
            .iter()
            .filter(|s| s.platform == item.source.platform && s.source_id == item.source.source_id)
        {
            if Self::accepts(subscription, item) {
                deliveries.push(self.deliver_one(item, message, subscription));
            } else {
                report.filtered += 1;
            }
        }

        for outcome in join_all(deliveries).await {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Unresolved => report.unresolved += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        metrics::record_dispatch_results(
            item.source.platform.as_str(),
            report.delivered,
            report.filtered,
            report.unresolved,
            report.failed,
        );

        tracing::debug!(
            source = %item.source,
            item = %item.item_id,
            delivered = report.delivered,
            filtered = report.filtered,
            unresolved = report.unresolved,
            failed = report.failed,
            "Dispatch finished"
        );

        report
    }

    async fn deliver_one(
        &self,
        item: &ContentItem,
        message: &RenderedMessage,
        subscription: &Subscription,
    ) -> Outcome {
        let destination = match self
            .client
            .resolve_destination(&subscription.community_id, &subscription.channel_id)
            .await
        {
            Ok(Some(destination)) => destination,
            Ok(None) => {
                tracing::warn!(
                    source = %item.source,
                    community = %subscription.community_id,
                    channel = %subscription.channel_id,
                    "Destination unresolvable, skipping subscription"
                );
                return Outcome::Unresolved;
            }
            Err(e) => {
                tracing::warn!(
                    source = %item.source,
                    channel = %subscription.channel_id,
                    error = %e,
                    "Failed to resolve destination"
                );
                return Outcome::Failed;
            }
        };

        let text = message.text_with_mention(subscription.mention_role_id.as_deref());
        match self.client.deliver(&destination, &text, message).await {
            Ok(()) => Outcome::Delivered,
            Err(e) => {
                tracing::error!(
                    source = %item.source,
                    item = %item.item_id,
                    destination = %destination,
                    client = self.client.name(),
                    error = %e,
                    "Delivery failed"
                );
                Outcome::Failed
            }
        }
    }
}
