use basket_store::{BasketStore, BasketStoreExt, InMemoryBasketStore, SetOptions};
use common::{BuyerId, CustomerBasket};
use criterion::{Criterion, criterion_group, criterion_main};

fn make_basket(buyer: &str, lines: i32) -> CustomerBasket {
    let mut basket = CustomerBasket::new(BuyerId::parse(buyer).unwrap());
    for product_id in 1..=lines {
        basket.add_product(product_id).unwrap();
    }
    basket
}

fn bench_upsert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryBasketStore::new();
    let basket = make_basket("bench-buyer", 10);

    c.bench_function("basket_store/upsert_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.upsert(basket.clone()).await.unwrap();
            });
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryBasketStore::new();
    let basket = make_basket("bench-buyer", 10);
    let buyer = basket.buyer_id.clone();
    rt.block_on(async {
        store.upsert(basket).await.unwrap();
    });

    c.bench_function("basket_store/get_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.get(&buyer).await.unwrap();
            });
        });
    });
}

fn bench_compare_and_swap(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryBasketStore::new();
    let basket = make_basket("bench-buyer", 3);

    c.bench_function("basket_store/read_modify_write", |b| {
        b.iter(|| {
            rt.block_on(async {
                let version = store.current_version(&basket.buyer_id).await.unwrap();
                store
                    .set(basket.clone(), SetOptions::expect_version(version))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_upsert, bench_get, bench_compare_and_swap);
criterion_main!(benches);
