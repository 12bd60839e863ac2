/// Benchmarks for the gateway read path: decoding frames into envelopes, and envelopes into
/// typed events.
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use guilded_client_sdk::gateway::{Opcode, decode};
use guilded_client_sdk::models::ChatMessageCreated;

const CHAT_MESSAGE_CREATED: &str = r#"{
    "op": 0,
    "t": "ChatMessageCreated",
    "s": "0d6e4c1c-7d2c-4b3c-9b61-1c2c5c6a7b8d",
    "d": {
        "serverId": "wlVr3Ggl",
        "message": {
            "id": "00000000-0000-0000-0000-000000000001",
            "type": "default",
            "serverId": "wlVr3Ggl",
            "channelId": "00000000-0000-0000-0000-0000000000c1",
            "content": "Hello **world**!",
            "createdAt": "2021-06-15T20:15:00.706Z",
            "createdBy": "Ann6LewA"
        }
    }
}"#;

const WELCOME: &str = r#"{
    "op": 1,
    "d": {
        "heartbeatIntervalMs": 22500,
        "lastMessageId": "0d6e4c1c-7d2c-4b3c-9b61-1c2c5c6a7b8d",
        "botId": "b1",
        "user": { "id": "Ann6LewA", "type": "bot", "name": "Test Bot" }
    }
}"#;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway/decode");

    group.throughput(Throughput::Bytes(CHAT_MESSAGE_CREATED.len() as u64));
    group.bench_function("Envelope::Event", |b| {
        b.iter(|| {
            decode(std::hint::black_box(CHAT_MESSAGE_CREATED.as_bytes()))
                .expect("Decoding should succeed")
        });
    });

    group.throughput(Throughput::Bytes(WELCOME.len() as u64));
    group.bench_function("Envelope::Welcome", |b| {
        b.iter(|| {
            let envelope = decode(std::hint::black_box(WELCOME.as_bytes()))
                .expect("Decoding should succeed");
            assert_eq!(envelope.opcode(), Opcode::Welcome, "welcome frame");
            envelope.welcome().expect("Welcome payload should parse")
        });
    });

    group.bench_function("Envelope::Malformed", |b| {
        b.iter(|| decode(std::hint::black_box(br#"{"op":0,"d":{}}"#)).is_err());
    });

    group.finish();
}

fn bench_typed_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway/typed_event");
    let envelope = decode(CHAT_MESSAGE_CREATED.as_bytes()).expect("Decoding should succeed");
    let data = envelope.data().cloned().expect("event carries data");

    group.bench_function("ChatMessageCreated", |b| {
        b.iter(|| {
            let _: ChatMessageCreated = serde_json::from_value(std::hint::black_box(data.clone()))
                .expect("Deserialization should succeed");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_typed_event);
criterion_main!(benches);
