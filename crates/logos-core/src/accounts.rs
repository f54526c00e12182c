use crate::error::LogosError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account-id -> currency-code -> balance map.
///
/// Balances are invariantly non-negative: debits that would go below zero
/// fail with a typed error instead of mutating. The core never mutates this
/// type directly; only the domain action executor does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    accounts: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documented default ledger used when persistence is empty or unreadable.
    pub fn bootstrap_defaults() -> Self {
        let mut state = Self::new();
        state.open_account("User_A");
        state.open_account("User_B");
        state
            .credit("User_A", "USD", 1000.0)
            .expect("default account exists");
        state
            .credit("User_B", "USD", 500.0)
            .expect("default account exists");
        state
    }

    pub fn open_account(&mut self, account: impl Into<String>) {
        self.accounts.entry(account.into()).or_default();
    }

    pub fn contains_account(&self, account: &str) -> bool {
        self.accounts.contains_key(account)
    }

    pub fn account_ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    pub fn balance(&self, account: &str, currency: &str) -> f64 {
        self.accounts
            .get(account)
            .and_then(|holdings| holdings.get(currency))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn holdings(&self, account: &str) -> Option<&BTreeMap<String, f64>> {
        self.accounts.get(account)
    }

    pub fn credit(
        &mut self,
        account: &str,
        currency: &str,
        amount: f64,
    ) -> Result<(), LogosError> {
        let holdings = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| LogosError::UnknownAccount(account.to_string()))?;
        *holdings.entry(currency.to_string()).or_insert(0.0) += amount;
        Ok(())
    }

    pub fn debit(&mut self, account: &str, currency: &str, amount: f64) -> Result<(), LogosError> {
        if !self.contains_account(account) {
            return Err(LogosError::UnknownAccount(account.to_string()));
        }
        let available = self.balance(account, currency);
        if available < amount {
            return Err(LogosError::InsufficientBalance {
                account: account.to_string(),
                currency: currency.to_string(),
                available,
                requested: amount,
            });
        }
        let holdings = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| LogosError::UnknownAccount(account.to_string()))?;
        *holdings.entry(currency.to_string()).or_insert(0.0) -= amount;
        Ok(())
    }

    /// Deep copy used for audit snapshots.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Flat iterator over (account, currency, balance) for reconciliation.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.accounts.iter().flat_map(|(account, holdings)| {
            holdings
                .iter()
                .map(move |(currency, balance)| (account.as_str(), currency.as_str(), *balance))
        })
    }
}

/// USD-pegged rate table over the supported currency set.
///
/// Rates are expressed as units of the currency per 1 USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
    default_currency: String,
}

impl Default for RateTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), 1.0);
        rates.insert("JPY".to_string(), 130.0);
        rates.insert("EUR".to_string(), 0.9);
        rates.insert("BTC".to_string(), 0.000_05);
        rates.insert("ETH".to_string(), 0.001);
        rates.insert("MATIC".to_string(), 1.5);
        Self {
            rates,
            default_currency: "USD".to_string(),
        }
    }
}

impl RateTable {
    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    pub fn supports(&self, currency: &str) -> bool {
        self.rates.contains_key(currency)
    }

    pub fn supported_currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    pub fn rate(&self, currency: &str) -> Result<f64, LogosError> {
        self.rates
            .get(currency)
            .copied()
            .ok_or_else(|| LogosError::UnsupportedCurrency(currency.to_string()))
    }

    /// Normalize an amount of `currency` to its USD-equivalent value.
    pub fn usd_equivalent(&self, currency: &str, amount: f64) -> Result<f64, LogosError> {
        Ok(amount / self.rate(currency)?)
    }

    /// Units of `to` credited per unit of `from`.
    pub fn conversion_rate(&self, from: &str, to: &str) -> Result<f64, LogosError> {
        Ok(self.rate(to)? / self.rate(from)?)
    }

    /// Convert an amount between two supported currencies through USD.
    pub fn convert(&self, from: &str, to: &str, amount: f64) -> Result<f64, LogosError> {
        Ok(amount * self.conversion_rate(from, to)?)
    }
}
