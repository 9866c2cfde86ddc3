use bencher::{TestCase, TestFile};
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::executor::block_on;
use micro_handlers::encoding::compress;
use micro_handlers::writer::{Recorder, ResponseWriter, write_all};
use micro_handlers::{Handler, Request};
use std::hint::black_box;

static SMALL_BODY: TestFile = TestFile::new("small.json", include_str!("../resources/body/small.json"));
static LARGE_BODY: TestFile = TestFile::new("large.json", include_str!("../resources/body/large.json"));

fn create_test_cases() -> Vec<TestCase> {
    vec![TestCase::small("small_body", SMALL_BODY), TestCase::large("large_body", LARGE_BODY)]
}

/// Writes the body in 4KiB chunks, the way a streaming handler would.
struct Body(&'static str);

#[async_trait::async_trait]
impl Handler for Body {
    async fn serve(&self, _req: Request, w: &mut dyn ResponseWriter) {
        for chunk in self.0.as_bytes().chunks(4096) {
            let _ = write_all(w, chunk);
        }
    }
}

fn request(accept_encoding: &str) -> Request {
    Request::new(
        http::Request::builder()
            .uri("/items")
            .header("accept-encoding", accept_encoding)
            .body(Bytes::new())
            .expect("request should build"),
    )
}

fn benchmark_compress(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("compress");

    for case in create_test_cases() {
        let handler = compress(Body(case.file().content()));
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));

        for coding in ["gzip", "deflate", "identity"] {
            let id = BenchmarkId::new(case.name(), coding);
            group.bench_with_input(id, &handler, |b, handler| {
                b.iter(|| {
                    let mut recorder = Recorder::new();
                    block_on(handler.serve(request(coding), &mut recorder));
                    black_box(recorder);
                });
            });
        }
    }

    group.finish();
}

criterion_group!(encoding, benchmark_compress);
criterion_main!(encoding);
