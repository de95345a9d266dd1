#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vidsearch::{
    Embedder, Embedding, FusionEngine, FusionSettings, IndexMatch, Namespace, ResultFormatter,
    Phrasebook, SearchService, SearchSettings, SimilarityQuery, TitleIndex, TitleResolver,
    Translator, VectorIndex,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub namespace: Namespace,
    pub top_k: usize,
    pub include_metadata: bool,
    pub filter: Option<Value>,
}

/// Index snapshot answering every query from fixed data.
#[derive(Default)]
pub struct StaticIndex {
    pub texts: Vec<IndexMatch>,
    pub meanings: Vec<IndexMatch>,
    pub meanings_by_partition: HashMap<String, Vec<IndexMatch>>,
    pub fail_namespace: Option<Namespace>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<RecordedQuery>>,
}

impl StaticIndex {
    pub fn new(texts: Vec<IndexMatch>, meanings: Vec<IndexMatch>) -> Self {
        Self {
            texts,
            meanings,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<RecordedQuery> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn query(&self, request: SimilarityQuery<'_>) -> anyhow::Result<Vec<IndexMatch>> {
        self.calls.lock().expect("calls lock").push(RecordedQuery {
            namespace: request.namespace,
            top_k: request.top_k,
            include_metadata: request.include_metadata,
            filter: request.filter.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_namespace == Some(request.namespace) {
            anyhow::bail!("{} namespace unavailable", request.namespace);
        }
        let source = match (request.namespace, &request.filter) {
            (Namespace::Text, _) => self.texts.clone(),
            (Namespace::Meaning, None) => self.meanings.clone(),
            (Namespace::Meaning, Some(filter)) => {
                let value = filter
                    .as_object()
                    .and_then(|map| map.values().next())
                    .and_then(|cond| cond.get("$eq"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.meanings_by_partition
                    .get(value)
                    .cloned()
                    .unwrap_or_default()
            }
        };
        Ok(source.into_iter().take(request.top_k).collect())
    }
}

/// Embedder returning a constant vector and counting calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
    pub fail: bool,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().expect("inputs lock").push(text.to_string());
        if self.fail {
            anyhow::bail!("embedding model overloaded");
        }
        Ok(Embedding {
            vector: vec![0.1, 0.2, 0.3],
            token_count: 4,
        })
    }
}

/// Translator tagging its output with the target language.
#[derive(Default)]
pub struct TaggingTranslator {
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl Translator for TaggingTranslator {
    fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        self.calls.lock().expect("calls lock").push((
            text.to_string(),
            source.to_string(),
            target.to_string(),
        ));
        Ok(format!("[{target}] {text}"))
    }
}

pub fn text_match(id: &str, score: f64, meaning_id: &str, title: &str) -> IndexMatch {
    let video = id.split('-').next().unwrap_or(id);
    let metadata = json!({
        "text": format!("segment {id}"),
        "url": format!("https://www.youtube.com/watch?v={video}"),
        "start": 30.0,
        "title": title,
        "published": 1_690_000_000,
        "meaning_id": meaning_id,
    });
    IndexMatch {
        id: id.to_string(),
        score,
        metadata: metadata.as_object().cloned(),
    }
}

pub fn phrases() -> Phrasebook {
    Phrasebook {
        greetings: vec!["Here is what I found:".to_string()],
        closers: vec!["Ask a follow-up!".to_string()],
        no_answer: "No answer found, please clarify.".to_string(),
        bullet: "👉".to_string(),
    }
}

pub fn engine(index: Arc<StaticIndex>, titles: TitleIndex, settings: FusionSettings) -> FusionEngine {
    FusionEngine::new(index, Arc::new(TitleResolver::new(titles)), settings).expect("engine")
}

pub fn service(
    index: Arc<StaticIndex>,
    embedder: Arc<CountingEmbedder>,
    translator: Arc<TaggingTranslator>,
    settings: SearchSettings,
) -> SearchService {
    SearchService::new(
        translator,
        embedder,
        engine(index, TitleIndex::default(), FusionSettings::default()),
        ResultFormatter::new(phrases()),
        settings,
    )
}
