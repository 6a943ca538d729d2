//! Subscription identity.

use std::collections::BTreeSet;
use std::fmt;

use pricefeed_traits::{AssetId, CurrencyCode};

/// Identity of one logical consumer interest: a set of assets in one currency.
///
/// Asset ids are deduplicated and kept in sorted order, so two keys built from
/// the same ids in any order compare and hash equal.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SubscriptionKey {
    asset_ids: BTreeSet<AssetId>,
    currency: CurrencyCode,
}

impl SubscriptionKey {
    /// Build a key from any collection of asset ids.
    pub fn new<I, A>(asset_ids: I, currency: impl Into<CurrencyCode>) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AssetId>,
    {
        Self {
            asset_ids: asset_ids.into_iter().map(Into::into).collect(),
            currency: currency.into(),
        }
    }

    /// Asset ids in canonical order.
    pub fn asset_ids(&self) -> &BTreeSet<AssetId> {
        &self.asset_ids
    }

    /// Currency code.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Whether the key covers `asset_id`.
    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.asset_ids.contains(asset_id)
    }

    /// Returns true if the key names no assets.
    pub fn is_empty(&self) -> bool {
        self.asset_ids.is_empty()
    }

    /// Asset ids as an owned list, for collaborator calls.
    pub fn to_vec(&self) -> Vec<AssetId> {
        self.asset_ids.iter().cloned().collect()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.asset_ids.iter().map(AssetId::as_str).collect();
        write!(f, "{}[{}]", self.currency, ids.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &SubscriptionKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_order_and_duplicates_ignored() {
        let a = SubscriptionKey::new(["ETH", "BTC", "ETH"], "USD");
        let b = SubscriptionKey::new(vec!["BTC".to_string(), "ETH".to_string()], "USD");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.asset_ids().len(), 2);
    }

    #[test]
    fn test_currency_is_part_of_identity() {
        let usd = SubscriptionKey::new(["BTC"], "USD");
        let eur = SubscriptionKey::new(["BTC"], "EUR");
        assert_ne!(usd, eur);
    }

    #[test]
    fn test_subset_is_a_different_key() {
        let one = SubscriptionKey::new(["BTC"], "USD");
        let two = SubscriptionKey::new(["BTC", "ETH"], "USD");
        assert_ne!(one, two);
        assert!(two.contains(&AssetId::new("BTC")));
        assert!(!one.contains(&AssetId::new("ETH")));
    }

    #[test]
    fn test_display_is_canonical() {
        let key = SubscriptionKey::new(["SOL", "BTC"], "EUR");
        assert_eq!(key.to_string(), "EUR[BTC,SOL]");
    }
}
