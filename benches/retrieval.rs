use criterion::{Criterion, criterion_group, criterion_main};
use qadocs::index::{DocMetadata, ElementKind, IndexedDocument, VectorIndex};
use qadocs::retriever::Bm25Index;
use std::hint::black_box;

fn corpus(size: usize) -> Vec<IndexedDocument> {
    let topics = [
        "voltage unbalance trip threshold configuration",
        "modbus register map and communication settings",
        "alarm escalation and event logging behavior",
        "current transformer ratio selection guide",
    ];

    (0..size)
        .map(|i| IndexedDocument {
            text: format!("{} variant {}", topics[i % topics.len()], i),
            metadata: DocMetadata {
                title: "Relay X".to_string(),
                doc_type: "product_spec".to_string(),
                page_no: i as i64,
                element_kind: ElementKind::Text,
                feature: None,
                original_filename: "relay.pdf".to_string(),
            },
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let documents = corpus(2000);

    c.bench_function("bm25_build", |b| {
        b.iter(|| Bm25Index::new(black_box(documents.clone())))
    });

    let bm25 = Bm25Index::new(documents.clone());
    c.bench_function("bm25_search", |b| {
        b.iter(|| bm25.search(black_box("voltage unbalance threshold"), 25))
    });

    let mut index = VectorIndex::new();
    for (i, doc) in documents.iter().enumerate() {
        let mut embedding = vec![0.0f32; 64];
        embedding[i % 64] = 1.0;
        embedding[(i * 7) % 64] = 0.5;
        index.insert(doc.clone(), embedding);
    }
    let query: Vec<f32> = (0..64).map(|i| (i % 3) as f32).collect();
    c.bench_function("dense_search", |b| {
        b.iter(|| index.search(black_box(&query), 25))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
