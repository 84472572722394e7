use criterion::{black_box, criterion_group, criterion_main, Criterion};
use delta_link::{
    Connection, Direction, FieldCodec, FieldDef, FieldValue, PacketSchema, Record, Registry,
    Role, SendOutcome,
};

const CITY_INFO: u8 = 31;

fn city_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            PacketSchema::new(CITY_INFO, "city_info", Direction::ServerToClient)
                .with_field(FieldDef::new("city_id", FieldCodec::UInt16).key())
                .with_field(FieldDef::new("size", FieldCodec::UInt8))
                .with_field(FieldDef::new("name", FieldCodec::Str { max_len: 32 }))
                .with_field(FieldDef::new("food_surplus", FieldCodec::SInt16))
                .with_field(FieldDef::new("shield_surplus", FieldCodec::SInt16))
                .with_field(FieldDef::new("trade_surplus", FieldCodec::SInt16))
                .with_field(FieldDef::new("celebrating", FieldCodec::Bool)),
        )
        .unwrap();
    registry
}

fn city(id: u16, size: u8) -> Record {
    Record::new(
        CITY_INFO,
        vec![
            FieldValue::U16(id),
            FieldValue::U8(size),
            FieldValue::Str("Alexandria".to_string()),
            FieldValue::I16(4),
            FieldValue::I16(-2),
            FieldValue::I16(7),
            FieldValue::Bool(false),
        ],
    )
}

fn established(role: Role) -> Connection {
    let mut conn = Connection::new(role);
    conn.establish();
    conn
}

fn bench_encode_snapshot(c: &mut Criterion) {
    let registry = city_registry();
    let mut conn = established(Role::Server);
    let mut id = 0u16;

    c.bench_function("encode_full_snapshot", |b| {
        b.iter(|| {
            // Every iteration hits a cold cache key.
            id = id.wrapping_add(1);
            black_box(registry.send(&mut conn, &city(id, 4)).unwrap())
        })
    });
}

fn bench_encode_delta(c: &mut Criterion) {
    let registry = city_registry();
    let mut conn = established(Role::Server);
    registry.send(&mut conn, &city(1, 0)).unwrap();
    let mut size = 0u8;

    c.bench_function("encode_one_field_delta", |b| {
        b.iter(|| {
            size = size.wrapping_add(1);
            black_box(registry.send(&mut conn, &city(1, size)).unwrap())
        })
    });
}

fn bench_encode_suppressed(c: &mut Criterion) {
    let registry = city_registry();
    let mut conn = established(Role::Server);
    let record = city(1, 4);
    registry.send(&mut conn, &record).unwrap();

    c.bench_function("encode_suppressed_resend", |b| {
        b.iter(|| black_box(registry.send(&mut conn, &record).unwrap()))
    });
}

fn bench_decode_snapshot(c: &mut Criterion) {
    let registry = city_registry();
    let mut server = established(Role::Server);
    let mut client = established(Role::Client);

    let SendOutcome::Sent(frame) = registry.send(&mut server, &city(1, 4)).unwrap() else {
        panic!("first send must go out");
    };

    c.bench_function("decode_full_snapshot", |b| {
        b.iter(|| black_box(registry.receive(&mut client, &frame).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_encode_snapshot,
    bench_encode_delta,
    bench_encode_suppressed,
    bench_decode_snapshot
);
criterion_main!(benches);
