//! Dobles de prueba para las capacidades externas.

use std::sync::Mutex;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::{RagError, Result};
use crate::llm::{AnswerGenerator, Embedder};
use crate::models::{Embedding, EmbeddingMode, IndexedRecord, QueryMatch};
use crate::vector_store::VectorIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedCall {
    pub model: String,
    pub texts: Vec<String>,
    pub mode: EmbeddingMode,
}

/// Embedder determinista: histograma de letras más una componente constante.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: Mutex<Vec<EmbedCall>>,
    fixed: Option<Vec<Embedding>>,
}

impl FakeEmbedder {
    pub fn returning_fixed(vectors: Vec<Embedding>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fixed: Some(vectors),
        }
    }

    pub fn calls(&self) -> Vec<EmbedCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn letter_histogram(text: &str) -> Embedding {
    let mut v = vec![0.0f32; 27];
    v[26] = 0.1;
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, model: &str, texts: &[String], mode: EmbeddingMode) -> Result<Vec<Embedding>> {
        self.calls.lock().unwrap().push(EmbedCall {
            model: model.to_string(),
            texts: texts.to_vec(),
            mode,
        });
        Ok(match &self.fixed {
            Some(vectors) => vectors.clone(),
            None => texts.iter().map(|t| letter_histogram(t)).collect(),
        })
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _model: &str, _texts: &[String], _mode: EmbeddingMode) -> Result<Vec<Embedding>> {
        Err(RagError::Embedding {
            provider: "fake".into(),
            message: "service unavailable".into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_metadata: bool,
}

/// Índice que registra las llamadas y devuelve coincidencias preparadas.
#[derive(Default)]
pub struct RecordingIndex {
    upserts: Mutex<Vec<Vec<IndexedRecord>>>,
    queries: Mutex<Vec<QueryCall>>,
    matches: Mutex<Vec<QueryMatch>>,
}

impl RecordingIndex {
    pub fn with_matches(matches: Vec<QueryMatch>) -> Self {
        Self {
            matches: Mutex::new(matches),
            ..Default::default()
        }
    }

    pub fn upserts(&self) -> Vec<Vec<IndexedRecord>> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<QueryCall> {
        self.queries.lock().unwrap().clone()
    }

    pub fn set_matches(&self, matches: Vec<QueryMatch>) {
        *self.matches.lock().unwrap() = matches;
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        self.upserts.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>> {
        self.queries.lock().unwrap().push(QueryCall {
            vector: vector.to_vec(),
            top_k,
            include_metadata,
        });
        Ok(self.matches.lock().unwrap().clone())
    }
}

pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn upsert(&self, _records: &[IndexedRecord]) -> Result<()> {
        Err(RagError::VectorIndex {
            backend: "fake".into(),
            message: "upsert rejected".into(),
        })
    }

    async fn query(&self, _vector: &[f32], _top_k: usize, _include_metadata: bool) -> Result<Vec<QueryMatch>> {
        Err(RagError::VectorIndex {
            backend: "fake".into(),
            message: "query rejected".into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateCall {
    pub model: String,
    pub prompt: String,
}

/// Generador que registra los prompts y responde con un texto numerado.
#[derive(Default)]
pub struct FakeGenerator {
    calls: Mutex<Vec<GenerateCall>>,
}

impl FakeGenerator {
    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for FakeGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(GenerateCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
        });
        Ok(format!("generated answer #{}", calls.len()))
    }
}

pub struct FailingGenerator;

#[async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String> {
        Err(RagError::Generation {
            provider: "fake".into(),
            message: "model overloaded".into(),
        })
    }
}

pub fn match_with_metadata(id: &str, metadata: serde_json::Value) -> QueryMatch {
    QueryMatch {
        id: id.to_string(),
        score: 0.5,
        metadata: metadata.as_object().cloned(),
    }
}

/// PDF válido con una página por texto, en el orden dado (Helvetica, A4).
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let media_box: Vec<Object> = vec![0.into(), 0.into(), 595.into(), 842.into()];
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box.clone(),
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
