#[cfg(test)]
mod tests {
    use crate::utils::{
        Harness, RecordingListener, RecordingSink, ScriptedChannel, change, completion, settings,
    };
    use engine_config::OrderingMode;
    use engine_processing::{
        importer::{Importer, pair::ChannelProgressPair},
        registry::ImporterRegistry,
    };
    use model::{core::identifiers::AckToken, records::record::Position};
    use std::{sync::Arc, time::Duration};

    // Scenario: a delivered batch of three data changes ending in record R is
    // acknowledged twice with the same token.
    // Expected Outcome: the channel sees exactly one acknowledge([R]) and the
    // listener exactly one update of 3.
    #[tokio::test]
    async fn repeated_ack_has_no_further_effect() {
        let registry = Arc::new(ImporterRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let last = change("orders", 3, 3);
        let channel = Arc::new(ScriptedChannel::new(
            "orders",
            vec![
                vec![change("orders", 1, 1), change("orders", 2, 2), last.clone()],
                vec![completion(4)],
            ],
        ));
        let listener = Arc::new(RecordingListener::default());

        let importer = Importer::builder(
            settings(OrderingMode::Unordered),
            sink.clone(),
            registry.clone(),
        )
        .channel(ChannelProgressPair::new(channel.clone(), listener.clone()))
        .build()
        .unwrap();
        importer.start().await.unwrap();

        let tokens = sink.tokens().await;
        assert_eq!(tokens.len(), 1);
        let before = channel.acknowledged().await.len();

        registry.acknowledge(&tokens[0]).await;
        registry.acknowledge(&tokens[0]).await;

        let acknowledged = channel.acknowledged().await;
        assert_eq!(acknowledged.len(), before + 1);
        assert_eq!(acknowledged.last(), Some(&vec![last]));
        assert_eq!(listener.updates().iter().filter(|n| **n == 3).count(), 1);
        assert_eq!(importer.metrics().snapshot().ack_misses, 1);
    }

    // Scenario: a batch is delivered but never acknowledged; the importer is
    // stopped and a new one is started against the same channel.
    // Expected Outcome: the committed position never moves, and the stale
    // token no longer resolves anywhere.
    #[tokio::test]
    async fn unacknowledged_batch_never_advances_the_channel() {
        let registry = Arc::new(ImporterRegistry::new());
        let first = Harness::with_registry(
            settings(OrderingMode::Unordered),
            &["orders"],
            registry.clone(),
        );
        first
            .push(0, vec![change("orders", 1, 1), change("orders", 2, 2)])
            .await;

        let running = tokio::spawn({
            let importer = first.importer.clone();
            async move { importer.start().await }
        });
        while first.sink.tokens().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        first.importer.stop().await;
        running.await.unwrap().unwrap();

        let stale = first.sink.tokens().await[0].clone();
        assert_eq!(first.channels[0].committed_position().await, None);

        let second = Importer::builder(
            settings(OrderingMode::Unordered),
            Arc::new(RecordingSink::default()),
            registry.clone(),
        )
        .channel(ChannelProgressPair::new(
            first.channels[0].clone(),
            first.trackers[0].clone(),
        ))
        .build()
        .unwrap();
        let resumed = tokio::spawn({
            let importer = second.clone();
            async move { importer.start().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        registry.acknowledge(&stale).await;
        second.stop().await;
        resumed.await.unwrap().unwrap();

        assert_eq!(first.channels[0].committed_position().await, None);
        assert_eq!(first.trackers[0].snapshot().processed_records, 0);
    }

    // Scenario: two importers share one registry.
    // Expected Outcome: each token is routed to the importer that issued it.
    #[tokio::test]
    async fn registry_routes_tokens_to_their_importer() {
        let registry = Arc::new(ImporterRegistry::new());
        let a = Harness::with_registry(settings(OrderingMode::Unordered), &["a"], registry.clone());
        let b = Harness::with_registry(settings(OrderingMode::Ordered), &["b"], registry.clone());
        a.push(0, vec![change("a", 1, 1), completion(2)]).await;
        b.push(0, vec![change("b", 10, 1), completion(11)]).await;

        a.run_to_completion().await;
        b.run_to_completion().await;
        assert_eq!(registry.len(), 2);

        b.acknowledge_all().await;
        assert_eq!(a.channels[0].committed_position().await, None);
        assert_eq!(b.channels[0].committed_position().await, Some(Position(11)));

        a.acknowledge_all().await;
        assert_eq!(a.channels[0].committed_position().await, Some(Position(2)));

        a.importer.stop().await;
        b.importer.stop().await;
        assert!(registry.is_empty());
    }

    // Scenario: a token whose importer id is unknown, and a token that carries
    // no importer id at all.
    // Expected Outcome: both are silently dropped.
    #[tokio::test]
    async fn foreign_tokens_are_ignored() {
        let h = Harness::new(settings(OrderingMode::Unordered), &["orders"]);
        h.push(0, vec![change("orders", 1, 1), completion(2)]).await;
        h.run_to_completion().await;

        h.registry.acknowledge(&AckToken::parse("stranger-abcdefghij")).await;
        h.registry.acknowledge(&AckToken::parse("garbage")).await;

        assert_eq!(h.channels[0].committed_position().await, None);
        assert_eq!(h.importer.pending_acknowledgements(), 1);
    }

    // Scenario: the ack arrives after the ledger entry has expired.
    // Expected Outcome: the entry is gone for good; the channel stays where it
    // was and the eviction is counted.
    #[tokio::test]
    async fn expired_entry_stalls_the_channel() {
        let mut config = settings(OrderingMode::Unordered);
        config.ack_cache.ttl_secs = 1;
        let h = Harness::new(config, &["orders"]);
        h.push(0, vec![change("orders", 1, 1), completion(2)]).await;
        h.run_to_completion().await;

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(h.importer.pending_acknowledgements(), 0);

        h.acknowledge_all().await;

        assert_eq!(h.channels[0].committed_position().await, None);
        let metrics = h.importer.metrics().snapshot();
        assert_eq!(metrics.ack_evictions, 1);
        assert_eq!(metrics.batches_acknowledged, 0);
    }
}
