//! Benchmarks for evaluation runs
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wirecast::broker::Broker;
use wirecast::config::{BrokerConfig, DeliveryPolicy, EngineConfig};
use wirecast::{Evaluator, Instruction, Operand, Operation};

/// A chain `w0 -> w1 -> ... -> w{n-1}` written in reverse order.
fn chain(len: usize) -> Vec<Instruction<u16>> {
    let mut instructions = vec![Instruction::set(1u16, "w0")];
    for i in 1..len {
        instructions.push(Instruction::binary(
            Operation::Xor,
            Operand::topic(format!("w{}", i - 1)),
            Operand::Literal(i as u16),
            format!("w{}", i),
        ));
    }
    instructions.reverse();
    instructions
}

/// Every node reads the same root wire.
fn fan_out(width: usize) -> Vec<Instruction<u16>> {
    let mut instructions = vec![Instruction::set(7u16, "root")];
    for i in 0..width {
        instructions.push(Instruction::binary(
            Operation::And,
            Operand::topic("root"),
            Operand::Literal(i as u16),
            format!("leaf{}", i),
        ));
    }
    instructions
}

fn bench_chain(c: &mut Criterion) {
    let evaluator = Evaluator::new(&EngineConfig::default());
    let mut group = c.benchmark_group("chain");

    for len in [16, 64, 256] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let last = format!("w{}", len - 1);
            b.iter(|| {
                let eval = evaluator.evaluate(chain(len), [last.as_str()]).unwrap();
                black_box(eval.value(&last))
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for delivery in [DeliveryPolicy::BestEffort, DeliveryPolicy::Reliable] {
        let mut config = EngineConfig::default();
        config.broker.delivery = delivery;
        let evaluator = Evaluator::new(&config);

        group.bench_function(BenchmarkId::new(delivery.to_string(), 64), |b| {
            b.iter(|| black_box(evaluator.evaluate_all(fan_out(64), ["leaf63"]).unwrap()))
        });
    }
    group.finish();
}

fn bench_broker_round_trip(c: &mut Criterion) {
    let broker = Broker::<u64>::spawn(&BrokerConfig::default()).unwrap();
    let mailbox = broker.subscribe("x").unwrap();

    c.bench_function("broker_publish_recv", |b| {
        b.iter(|| {
            broker.publish("x", black_box(42)).unwrap();
            black_box(mailbox.recv().unwrap())
        })
    });
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_broker_round_trip);
criterion_main!(benches);
