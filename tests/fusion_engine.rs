mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{engine, text_match, StaticIndex};
use pretty_assertions::assert_eq;
use serde_json::json;
use vidsearch::{
    FusionSettings, IndexMatch, MeaningRetrieval, Namespace, SearchError, TitleIndex, Upstream,
};

fn snapshot() -> StaticIndex {
    StaticIndex::new(
        vec![
            text_match("v1-0", 0.9, "v1-t0", "First talk"),
            text_match("v1-1", 0.5, "v1-t1", "First talk"),
            text_match("v2-0", 0.7, "v2-t0", "Second talk - Даниил Зуев расскажет"),
            text_match("v3-0", 0.95, "gone", "Third talk"),
        ],
        vec![
            IndexMatch::bare("v1-t0", 0.8),
            IndexMatch::bare("v1-t1", 0.3),
            IndexMatch::bare("v2-t0", 0.9),
        ],
    )
}

#[tokio::test(flavor = "current_thread")]
async fn ranks_one_result_per_video() {
    let index = Arc::new(snapshot());
    let engine = engine(index.clone(), TitleIndex::default(), FusionSettings::default());

    let results = engine.rank(&[0.1, 0.2], 5).await.expect("rank");
    let summary: Vec<(String, String)> = results
        .iter()
        .map(|r| (r.video_id.clone(), r.title.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("v2".to_string(), "Second talk".to_string()),
            ("v1".to_string(), "First talk".to_string()),
        ]
    );
    assert_eq!(results[0].relevance, 0.4 * 0.7 + 0.6 * 0.9);
    assert_eq!(results[1].relevance, 0.4 * 0.9 + 0.6 * 0.8);
    assert_eq!(results[1].url, "https://www.youtube.com/watch?v=v1&t=30");
}

#[tokio::test(flavor = "current_thread")]
async fn queries_both_namespaces_with_configured_sizes() {
    let index = Arc::new(snapshot());
    let engine = engine(index.clone(), TitleIndex::default(), FusionSettings::default());
    engine.rank(&[0.1], 3).await.expect("rank");

    let mut calls = index.recorded();
    calls.sort_by_key(|c| c.namespace.as_str());
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].namespace, Namespace::Meaning);
    assert_eq!(calls[0].top_k, 1600);
    assert!(!calls[0].include_metadata);
    assert_eq!(calls[1].namespace, Namespace::Text);
    assert_eq!(calls[1].top_k, 20);
    assert!(calls[1].include_metadata);
}

#[tokio::test(flavor = "current_thread")]
async fn repeated_ranking_is_identical() {
    let index = Arc::new(snapshot());
    let engine = engine(index, TitleIndex::default(), FusionSettings::default());
    let first = engine.rank(&[0.3], 5).await.expect("rank");
    let second = engine.rank(&[0.3], 5).await.expect("rank");
    assert_eq!(first, second);
}

#[tokio::test(flavor = "current_thread")]
async fn only_unmatched_segment_yields_empty_ranking() {
    let index = Arc::new(StaticIndex::new(
        vec![text_match("v1-0", 0.9, "nowhere", "T")],
        vec![IndexMatch::bare("m1", 0.8)],
    ));
    let engine = engine(index, TitleIndex::default(), FusionSettings::default());
    assert!(engine.rank(&[0.1], 3).await.expect("rank").is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn empty_index_is_not_an_error() {
    let index = Arc::new(StaticIndex::default());
    let engine = engine(index, TitleIndex::default(), FusionSettings::default());
    assert!(engine.rank(&[0.1], 3).await.expect("rank").is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn curated_titles_override_metadata() {
    let index = Arc::new(snapshot());
    let titles = TitleIndex::from_pairs([("v2", "Curated second")]);
    let engine = engine(index, titles, FusionSettings::default());
    let results = engine.rank(&[0.1], 1).await.expect("rank");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Curated second");
}

#[tokio::test(flavor = "current_thread")]
async fn partitioned_meanings_are_merged() {
    let mut index = StaticIndex::new(
        vec![
            text_match("a-0", 0.6, "a-t0", "A"),
            text_match("b-0", 0.6, "b-t0", "B"),
        ],
        Vec::new(),
    );
    index.meanings_by_partition = HashMap::from([
        ("PL1".to_string(), vec![IndexMatch::bare("a-t0", 0.5)]),
        ("PL2".to_string(), vec![IndexMatch::bare("b-t0", 0.9)]),
    ]);
    let index = Arc::new(index);
    let settings = FusionSettings {
        meaning_retrieval: MeaningRetrieval::Partitioned {
            field: "playlist_id".to_string(),
            values: vec!["PL1".to_string(), "PL2".to_string(), "PL3".to_string()],
            max_concurrency: 10,
        },
        ..FusionSettings::default()
    };
    let engine = engine(index.clone(), TitleIndex::default(), settings);

    let ids: Vec<String> = engine
        .rank(&[0.1], 5)
        .await
        .expect("rank")
        .into_iter()
        .map(|r| r.video_id)
        .collect();
    assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);

    let meaning_calls: Vec<_> = index
        .recorded()
        .into_iter()
        .filter(|c| c.namespace == Namespace::Meaning)
        .collect();
    assert_eq!(meaning_calls.len(), 3);
    assert!(meaning_calls.iter().all(|c| c.top_k == 160));
    assert_eq!(
        meaning_calls[0].filter,
        Some(json!({"playlist_id": {"$eq": "PL1"}}))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitioned_ranking_runs_on_spawned_tasks() {
    let mut index = StaticIndex::new(vec![text_match("a-0", 0.6, "a-t0", "A")], Vec::new());
    index.meanings_by_partition =
        HashMap::from([("PL1".to_string(), vec![IndexMatch::bare("a-t0", 0.5)])]);
    let settings = FusionSettings {
        meaning_retrieval: MeaningRetrieval::Partitioned {
            field: "playlist_id".to_string(),
            values: vec!["PL1".to_string(), "PL2".to_string()],
            max_concurrency: 2,
        },
        ..FusionSettings::default()
    };
    let engine = engine(Arc::new(index), TitleIndex::default(), settings);

    let task = tokio::spawn(async move { engine.rank(&[0.1, 0.2], 3).await });
    let results = task.await.expect("join").expect("rank");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].video_id, "a");
}

#[tokio::test(flavor = "current_thread")]
async fn index_failure_propagates_as_upstream() {
    let mut index = snapshot();
    index.fail_namespace = Some(Namespace::Meaning);
    let engine = engine(Arc::new(index), TitleIndex::default(), FusionSettings::default());
    match engine.rank(&[0.1], 3).await {
        Err(SearchError::UpstreamUnavailable { service, .. }) => {
            assert_eq!(service, Upstream::VectorIndex)
        }
        other => panic!("expected upstream failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn slow_index_times_out() {
    let mut index = snapshot();
    index.delay = Some(Duration::from_secs(60));
    let settings = FusionSettings {
        query_timeout: Duration::from_secs(2),
        ..FusionSettings::default()
    };
    let engine = engine(Arc::new(index), TitleIndex::default(), settings);
    match engine.rank(&[0.1], 3).await {
        Err(SearchError::Timeout { service, after }) => {
            assert_eq!(service, Upstream::VectorIndex);
            assert_eq!(after, Duration::from_secs(2));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn partitioned_retrieval_without_values_is_rejected() {
    let settings = FusionSettings {
        meaning_retrieval: MeaningRetrieval::Partitioned {
            field: "playlist_id".to_string(),
            values: Vec::new(),
            max_concurrency: 10,
        },
        ..FusionSettings::default()
    };
    let result = vidsearch::FusionEngine::new(
        Arc::new(StaticIndex::default()),
        Arc::new(vidsearch::TitleResolver::new(TitleIndex::default())),
        settings,
    );
    assert!(matches!(result, Err(SearchError::InvalidConfig(_))));
}
