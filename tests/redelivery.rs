mod support;

use std::sync::Arc;

use offerfold::test_support::{generate_batch, BatchShape, MessageFactory};
use offerfold::{MemoryStores, RecordingTransport};
use support::{all_modes, process_all, stored_state};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redelivered_batch_leaves_state_unchanged() -> anyhow::Result<()> {
    for (label, options) in all_modes() {
        let mut factory = MessageFactory::new(2);
        let batch = generate_batch(&mut factory, BatchShape::default(), 99);
        let stores = MemoryStores::default();
        let transport = Arc::new(RecordingTransport::new());

        process_all(&stores, options, std::slice::from_ref(&batch), &transport).await?;
        let once = stored_state(&stores);
        process_all(&stores, options, std::slice::from_ref(&batch), &transport).await?;
        let twice = stored_state(&stores);

        assert_eq!(once, twice, "{label}");
        let log = transport.log();
        assert_eq!(log.commits.len(), 2, "{label}");
        assert_eq!(log.commits[0], log.commits[1], "{label}");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deltas_alone_are_idempotent_on_redelivery() -> anyhow::Result<()> {
    let mut factory = MessageFactory::new(0);
    let snapshots = vec![
        factory.contest("c1"),
        factory.proposition("c1", "p1", &["o1", "o2"]),
        factory.market("c1", "p1"),
    ];
    let seed = factory.batch(snapshots);
    let deltas = vec![
        factory.proposition_changed("c1", "p1", Some("Winner"), Some(false)),
        factory.option_changed("c1", "p1", "o3", Some("Draw"), Some(true)),
        factory.variant_changed("c1", "p1", "v2", Some("Handicap"), None),
        factory.outcome_changed("c1", "p1", "o3", "v2", Some(true)),
        factory.outcome_result("c1", "p1", "o1", "v1", "Won", 2.5),
        factory.price_changed("c1", "p1", "o1", "v1", 1.75),
    ];
    let deltas = factory.batch(deltas);

    for (label, options) in all_modes() {
        let stores = MemoryStores::default();
        let transport = Arc::new(RecordingTransport::new());
        process_all(&stores, options, &[seed.clone(), deltas.clone()], &transport).await?;
        let once = stored_state(&stores);
        process_all(&stores, options, std::slice::from_ref(&deltas), &transport).await?;
        assert_eq!(stored_state(&stores), once, "{label}");

        let proposition = once.propositions.values().next().expect(label);
        assert_eq!(proposition.name, "Winner", "{label}");
        assert!(!proposition.is_available, "{label}");
        assert_eq!(proposition.options.len(), 3, "{label}");
        assert_eq!(proposition.variants.len(), 2, "{label}");
        assert_eq!(proposition.results.len(), 1, "{label}");
    }
    Ok(())
}
