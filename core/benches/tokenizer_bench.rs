use criterion::{criterion_group, criterion_main, Criterion};
use spimi_core::codec::IndexLine;
use spimi_core::extract::HtmlExtractor;
use spimi_core::tokenizer::tokenize;
use spimi_core::Posting;

const PAGE: &str = "<html><head><title>Information Retrieval</title></head><body>\
    <h1>Inverted indices</h1><p>An <b>inverted index</b> maps each term to the \
    documents containing it. Building one for a large corpus in bounded memory \
    means writing sorted partial indices and merging them afterwards.</p>\
    <h4>Ranking</h4><p>Weights combine term frequency with inverse document \
    frequency, so rare terms count for more.</p></body></html>";

fn bench_tokenize(c: &mut Criterion) {
    let text = PAGE.repeat(20);
    c.bench_function("tokenize_page", |b| b.iter(|| tokenize(&text)));
}

fn bench_extract(c: &mut Criterion) {
    let extractor = HtmlExtractor::new();
    c.bench_function("extract_page", |b| b.iter(|| extractor.extract("https://bench/", PAGE)));
}

fn bench_decode(c: &mut Criterion) {
    let postings = (0..500u32).map(|d| Posting::new(d, 1.0 / (d as f64 + 1.0))).collect();
    let line = IndexLine::new("term", postings).encode();
    c.bench_function("decode_shard_line", |b| b.iter(|| IndexLine::<f64>::decode(&line)));
}

criterion_group!(benches, bench_tokenize, bench_extract, bench_decode);
criterion_main!(benches);
