//! Criterion benchmarks for coin selection and fee convergence.
//!
//! Covers: random-improve and largest-first on a 500-entry pool, and full
//! assembly of a two-output sale.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rental_core::address::{Address, NetworkId};
use rental_core::types::{
    AssetId, AssetName, Balance, ChainTip, KeyHash, OutPoint, PolicyId, ProtocolParameters, TxHash,
    TxOutput, Utxo,
};
use rental_wallet::{LargestFirst, RandomImprove, SelectionRequest, SelectionStrategy, TransactionBuilder};

fn params() -> ProtocolParameters {
    ProtocolParameters { min_fee_a: 44, min_fee_b: 155_381, coins_per_utxo_byte: 4_310, max_tx_size: 16_384 }
}

fn address(tag: u8) -> Address {
    Address::Base { network: NetworkId::Testnet, payment: KeyHash([tag; 28]), stake: KeyHash([tag; 28]) }
}

fn nft() -> AssetId {
    AssetId::new(PolicyId([0x42; 28]), AssetName::new(b"Bench".to_vec()).unwrap())
}

/// 500 UTXOs of varying size; one carries the NFT.
fn pool() -> Vec<Utxo> {
    (0..500u32)
        .map(|i| {
            let mut hash = [0u8; 32];
            hash[..4].copy_from_slice(&i.to_be_bytes());
            let mut balance = Balance::from_lovelace(1_000_000 + u64::from(i % 37) * 250_000);
            if i == 317 {
                balance = balance.with_asset(nft(), 1);
            }
            Utxo { outpoint: OutPoint { tx_hash: TxHash(hash), index: i % 4 }, balance }
        })
        .collect()
}

fn bench_random_improve(c: &mut Criterion) {
    let pool = pool();
    let p = params();
    let change = address(1);
    let outputs = vec![TxOutput::payment(address(2), Balance::from_lovelace(25_000_000).with_asset(nft(), 1))];
    let strategy = RandomImprove::seeded(7);

    c.bench_function("random_improve_500", |b| {
        b.iter(|| {
            let req = SelectionRequest {
                pool: black_box(&pool),
                outputs: &outputs,
                change_address: &change,
                fee_reserve: 180_000,
                params: &p,
            };
            strategy.select(&req)
        })
    });
}

fn bench_largest_first(c: &mut Criterion) {
    let pool = pool();
    let p = params();
    let change = address(1);
    let outputs = vec![TxOutput::payment(address(2), Balance::from_lovelace(25_000_000))];

    c.bench_function("largest_first_500", |b| {
        b.iter(|| {
            let req = SelectionRequest {
                pool: black_box(&pool),
                outputs: &outputs,
                change_address: &change,
                fee_reserve: 180_000,
                params: &p,
            };
            LargestFirst.select(&req)
        })
    });
}

fn bench_build_sale(c: &mut Criterion) {
    let pool = pool();
    let p = params();
    let change = address(1);
    let tip = ChainTip { abs_slot: 50_000_000, epoch: 120, block_height: 2_500_000 };
    let mut builder = TransactionBuilder::new();
    builder.add_payment(address(2), Balance::from_lovelace(2_000_000).with_asset(nft(), 1));
    builder.set_strategy(std::sync::Arc::new(RandomImprove::seeded(3)));

    c.bench_function("build_nft_sale", |b| {
        b.iter(|| builder.build(black_box(&pool), &change, &p, &tip))
    });
}

criterion_group!(benches, bench_random_improve, bench_largest_first, bench_build_sale);
criterion_main!(benches);
