//! Shared fixtures for the cache guard integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use productguard::application::repos::{RecordStore, RepoError};
use productguard::cache::GuardConfig;
use productguard::domain::Product;

/// Record store that counts reads, can be slowed down and can fail on demand.
#[derive(Default)]
pub struct CountingRecords {
    products: DashMap<i64, Product>,
    reads: AtomicUsize,
    pending_failures: AtomicUsize,
    delay: Duration,
}

impl CountingRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn insert(&self, product: Product) {
        self.products.insert(product.pid, product);
    }

    pub fn remove(&self, pid: i64) {
        self.products.remove(&pid);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, times: usize) {
        self.pending_failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CountingRecords {
    type Record = Product;

    async fn get_by_identifier(&self, id: i64) -> Result<Option<Product>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RepoError::from_persistence("injected record store failure"));
        }
        Ok(self.products.get(&id).map(|entry| entry.value().clone()))
    }
}

pub fn widget() -> Product {
    Product {
        pid: 42,
        name: "widget".to_string(),
        describe: "a small widget".to_string(),
        sku_id: 7,
    }
}

pub const WIDGET_BLOB: &str = r#"{"Pid":42,"Name":"widget","Describe":"a small widget","SkuId":7}"#;

pub fn product(pid: i64) -> Product {
    Product {
        pid,
        name: format!("product-{pid}"),
        describe: String::new(),
        sku_id: pid * 10,
    }
}

pub fn guard_config() -> GuardConfig {
    GuardConfig::default()
}
