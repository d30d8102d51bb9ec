//! Domain types cached by the guard.

pub mod products;

pub use products::Product;

/// A record that can be cached under a numeric identifier.
pub trait Entity {
    /// Entity name used as the middle segment of cache keys.
    const NAME: &'static str;

    fn identifier(&self) -> i64;
}
