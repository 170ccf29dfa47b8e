//! Whole-pipeline seed scenario over shared in-memory backends: collect,
//! process, render, drain, publish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use mill_collector::testing::StaticSource;
use mill_collector::{run_collection, CollectorContext};
use mill_core::config::LlmConfig;
use mill_core::content::{CollectedItem, Engagement};
use mill_core::envelope::Operation;
use mill_core::ids;
use mill_core::Shutdown;
use mill_imagery::testing::ScriptedImageProvider;
use mill_imagery::{ImageDispatcher, ImageProvider, StockImage};
use mill_llm::testing::ScriptedProvider;
use mill_llm::LlmClient;
use mill_processor::{handle_topic_message, ProcessorContext, TopicStatus};
use mill_publisher::testing::CopyBuilder;
use mill_publisher::{handle_build_message, DeployStatus, PublisherContext};
use mill_queue::{parse_envelope, InMemoryQueue, QueueClient};
use mill_renderer::{handle_render_message, DrainMonitor, RenderStatus, RendererContext};
use mill_storage::{containers, BlobStore, LeaseManager};
use mill_throttle::BackoffConfig;

fn seed_items(source: &str, names: &[&str]) -> Vec<CollectedItem> {
    names
        .iter()
        .map(|n| {
            let title = format!("A long enough {n} headline from {source}");
            let url = format!("https://example.com/{source}/{n}");
            CollectedItem {
                item_id: n.to_string(),
                source: source.to_string(),
                excerpt: None,
                engagement: Engagement {
                    score: 80,
                    comments: 15,
                },
                fetched_at: Utc::now(),
                content_hash: ids::content_hash(&url, &title),
                topic_id: ids::topic_id(source, n),
                title,
                url,
            }
        })
        .collect()
}

fn llm_config() -> LlmConfig {
    LlmConfig {
        provider: "openai".to_string(),
        openai_api_key: Some("sk-test".to_string()),
        openai_model: "test".to_string(),
        openai_base_url: None,
        anthropic_api_key: None,
        anthropic_model: String::new(),
        temperature: 0.7,
        max_tokens: 2048,
        timeout_secs: 5,
        rate_limit_per_min: 6000,
        prompt_cost_per_1k: 0.001,
        completion_cost_per_1k: 0.002,
    }
}

#[tokio::test]
async fn two_sources_flow_through_to_one_publish() {
    let store = BlobStore::in_memory();
    let process_queue = Arc::new(InMemoryQueue::new());
    let render_queue = Arc::new(InMemoryQueue::new());
    let publish_queue = Arc::new(InMemoryQueue::new());

    // 1. Collect: two sources, three items each.
    let collector = CollectorContext {
        store: store.clone(),
        process_queue: process_queue.clone(),
        dedup_window_hours: 48,
        send_backoff: BackoffConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        },
    };
    let sources = vec![
        StaticSource::adapter("forum-a", seed_items("forum-a", &["one", "two", "three"])),
        StaticSource::adapter("feed-b", seed_items("feed-b", &["four", "five", "six"])),
    ];
    let outcome = run_collection(&collector, &sources, uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(outcome.accepted_count, 6);
    assert_eq!(outcome.queue_messages_sent, 6);
    assert_eq!(
        store
            .list(containers::COLLECTED, "collections/")
            .await
            .unwrap()
            .len(),
        1,
        "one audit blob"
    );

    // 2. Process all six topic messages.
    let processor = ProcessorContext {
        processor_id: "proc-e2e".to_string(),
        store: store.clone(),
        leases: LeaseManager::new(store.clone()),
        render_queue: render_queue.clone(),
        llm: LlmClient::new(Arc::new(ScriptedProvider::echo()), &llm_config()),
        lease_ttl: chrono::Duration::seconds(300),
        call_deadline: Duration::from_secs(5),
        write_attempts: 3,
    };
    let topic_messages = process_queue.receive(10, 90).await.unwrap();
    assert_eq!(topic_messages.len(), 6);
    for message in &topic_messages {
        let envelope = parse_envelope(message).unwrap();
        assert_eq!(envelope.operation, Operation::ProcessTopic);
        let result = handle_topic_message(&processor, &envelope).await;
        assert_eq!(result.status, TopicStatus::Success);
        process_queue.delete(&message.receipt_handle).await.unwrap();
    }
    assert_eq!(
        store
            .list(containers::PROCESSED, "articles/")
            .await
            .unwrap()
            .len(),
        6
    );

    // 3. Render all six articles; the drain monitor coalesces one build.
    let drain = Arc::new(DrainMonitor::new());
    let hero = StockImage {
        url: "https://img.example/hero.jpg".to_string(),
        thumbnail_url: None,
        credit: "Photo by Test".to_string(),
        source: "stock".to_string(),
    };
    let renderer = RendererContext {
        store: store.clone(),
        publish_queue: publish_queue.clone(),
        images: ImageDispatcher::new(vec![(
            Arc::new(ScriptedImageProvider::always_ok("stock", hero)) as Arc<dyn ImageProvider>,
            mill_throttle::TokenBucket::new(100.0, 1.0),
        )]),
        drain: drain.clone(),
    };
    let render_messages = render_queue.receive(10, 60).await.unwrap();
    assert_eq!(render_messages.len(), 6);
    for message in &render_messages {
        let envelope = parse_envelope(message).unwrap();
        let result = handle_render_message(&renderer, &envelope).await;
        assert_eq!(result.status, RenderStatus::Rendered);
        render_queue.delete(&message.receipt_handle).await.unwrap();
    }
    assert_eq!(store.list(containers::MARKDOWN, "").await.unwrap().len(), 6);

    // Drain: queue is empty and stable, exactly one build signal.
    let window = Duration::from_millis(20);
    assert!(drain.observe(0, window).is_none(), "stability clock starts");
    tokio::time::sleep(window + Duration::from_millis(10)).await;
    let build = drain.observe(0, window).expect("one coalesced build");
    assert_eq!(build.markdown_count, 6);
    assert!(drain.observe(0, window).is_none(), "no second build");

    // 4. Publish.
    let publisher = PublisherContext {
        store: store.clone(),
        builder: Arc::new(CopyBuilder),
        work_dir: std::env::temp_dir().join(format!("mill-e2e-{}", uuid::Uuid::new_v4())),
        output_max_mb: 50,
        progress_every: 500,
        site_url: "https://site.example".to_string(),
    };
    let envelope = mill_core::envelope::MessageEnvelope::new(
        "renderer",
        Operation::PublishSite,
        &build,
    )
    .unwrap();
    let result = handle_build_message(&publisher, &envelope, &Shutdown::new()).await;
    assert_eq!(result.status, DeployStatus::Success);
    assert!(result.errors.is_empty());
    // Six article pages plus the index.
    assert!(result.uploaded_files >= 7);

    let live = store.list(containers::WEB, "").await.unwrap();
    assert!(live.iter().any(|m| m.name == "index.html"));
    std::fs::remove_dir_all(&publisher.work_dir).ok();
}
