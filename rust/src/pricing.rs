use std::sync::{Arc, RwLock};

/// Live ETH → fiat exchange rate, supplied by the wallet layer.
#[uniffi::export(callback_interface)]
pub trait ExchangeRateProvider: Send + Sync + 'static {
    fn exchange_rate(&self) -> f64;
}

pub type SharedExchangeRateProvider = Arc<RwLock<Option<Arc<dyn ExchangeRateProvider>>>>;

/// A fixed rate; used when the host never registers a provider.
#[derive(Debug, Clone, Copy)]
pub struct FixedExchangeRate(pub f64);

impl ExchangeRateProvider for FixedExchangeRate {
    fn exchange_rate(&self) -> f64 {
        self.0
    }
}

/// Read the registered provider's rate, or `fallback` when none is set or it
/// returns something unusable.
pub(crate) fn current_rate(shared: &SharedExchangeRateProvider, fallback: f64) -> f64 {
    let provider = match shared.read() {
        Ok(g) => g.clone(),
        Err(poison) => poison.into_inner().clone(),
    };
    let rate = provider.map(|p| p.exchange_rate()).unwrap_or(fallback);
    if rate.is_finite() && rate >= 0.0 {
        rate
    } else {
        tracing::warn!(rate, "ignoring invalid exchange rate");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_without_provider() {
        let shared: SharedExchangeRateProvider = Arc::new(RwLock::new(None));
        assert_eq!(current_rate(&shared, 12.5), 12.5);
    }

    #[test]
    fn uses_registered_provider() {
        let provider: Arc<dyn ExchangeRateProvider> = Arc::new(FixedExchangeRate(300.0));
        let shared: SharedExchangeRateProvider = Arc::new(RwLock::new(Some(provider)));
        assert_eq!(current_rate(&shared, 12.5), 300.0);
    }

    #[test]
    fn rejects_nan_rates() {
        let provider: Arc<dyn ExchangeRateProvider> = Arc::new(FixedExchangeRate(f64::NAN));
        let shared: SharedExchangeRateProvider = Arc::new(RwLock::new(Some(provider)));
        assert_eq!(current_rate(&shared, 1.0), 1.0);
    }
}
