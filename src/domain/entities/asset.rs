use serde::{Deserialize, Serialize};

/// Broad asset classification used by the fundamental score and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Layer1,
    Layer2,
    DeFi,
    Stablecoin,
    Other,
}

impl Default for AssetClass {
    fn default() -> Self {
        AssetClass::Other
    }
}

/// Tracked crypto asset. Created once per tracked symbol, mutated by data
/// refresh, never hard-deleted (only deactivated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub classification: AssetClass,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub latest_price: f64,
    /// 24h price change in percent (e.g. -3.2 for a 3.2% drop).
    pub change_24h: f64,
    pub is_active: bool,
    pub exchange_supported: bool,
}

/// One row of a market snapshot as delivered by the data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub symbol: String,
    pub name: String,
    pub classification: AssetClass,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub price: f64,
    pub change_24h: f64,
}

impl Asset {
    pub fn from_snapshot(snapshot: &AssetSnapshot) -> Self {
        Asset {
            symbol: snapshot.symbol.clone(),
            name: snapshot.name.clone(),
            classification: snapshot.classification,
            market_cap: snapshot.market_cap,
            volume_24h: snapshot.volume_24h,
            latest_price: snapshot.price,
            change_24h: snapshot.change_24h,
            is_active: true,
            exchange_supported: true,
        }
    }

    /// Apply a refreshed market snapshot. Identity fields (symbol, name,
    /// classification at creation) are preserved.
    pub fn apply_snapshot(&mut self, snapshot: &AssetSnapshot) {
        self.market_cap = snapshot.market_cap;
        self.volume_24h = snapshot.volume_24h;
        self.latest_price = snapshot.price;
        self.change_24h = snapshot.change_24h;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn is_tradable(&self) -> bool {
        self.is_active && self.exchange_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AssetSnapshot {
        AssetSnapshot {
            symbol: "BTC-USD".to_string(),
            name: "Bitcoin".to_string(),
            classification: AssetClass::Layer1,
            market_cap: 1.2e12,
            volume_24h: 3.0e10,
            price: 60000.0,
            change_24h: 1.5,
        }
    }

    #[test]
    fn test_asset_from_snapshot() {
        let asset = Asset::from_snapshot(&snapshot());
        assert_eq!(asset.symbol, "BTC-USD");
        assert!(asset.is_active);
        assert!(asset.is_tradable());
        assert_eq!(asset.latest_price, 60000.0);
    }

    #[test]
    fn test_apply_snapshot_updates_market_fields() {
        let mut asset = Asset::from_snapshot(&snapshot());
        let mut refreshed = snapshot();
        refreshed.price = 61000.0;
        refreshed.change_24h = 3.0;
        asset.apply_snapshot(&refreshed);
        assert_eq!(asset.latest_price, 61000.0);
        assert_eq!(asset.change_24h, 3.0);
    }

    #[test]
    fn test_deactivate_keeps_asset() {
        let mut asset = Asset::from_snapshot(&snapshot());
        asset.deactivate();
        assert!(!asset.is_active);
        assert!(!asset.is_tradable());
        assert_eq!(asset.symbol, "BTC-USD");
    }
}
