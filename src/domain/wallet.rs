//! Agent wallets and the deltas trades apply to them.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Long position in bonds minted at one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Long {
    pub balance: Decimal,
}

/// Short position in bonds minted at one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Short {
    pub balance: Decimal,
    /// Share price of the checkpoint the short was opened in.
    pub open_share_price: Decimal,
}

/// Change to a wallet produced by one trade. Positions are keyed by mint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDeltas {
    pub address: u64,
    pub balance: Decimal,
    pub lp_tokens: Decimal,
    pub withdrawal_shares: Decimal,
    pub longs: BTreeMap<u64, Long>,
    pub shorts: BTreeMap<u64, Short>,
    pub fees_paid: Decimal,
}

impl WalletDeltas {
    pub fn new(address: u64) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

/// A trading agent's holdings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: u64,
    /// Base held outside the market.
    pub balance: Decimal,
    pub lp_tokens: Decimal,
    pub withdrawal_shares: Decimal,
    pub longs: BTreeMap<u64, Long>,
    pub shorts: BTreeMap<u64, Short>,
    pub fees_paid: Decimal,
}

impl Wallet {
    pub fn new(address: u64, budget: Decimal) -> Self {
        Self {
            address,
            balance: budget,
            ..Self::default()
        }
    }

    pub fn long_balance(&self, mint_time: u64) -> Decimal {
        self.longs.get(&mint_time).map_or(Decimal::ZERO, |long| long.balance)
    }

    pub fn short_balance(&self, mint_time: u64) -> Decimal {
        self.shorts.get(&mint_time).map_or(Decimal::ZERO, |short| short.balance)
    }

    pub fn short_open_share_price(&self, mint_time: u64) -> Option<Decimal> {
        self.shorts.get(&mint_time).map(|short| short.open_share_price)
    }

    /// Apply a trade's wallet delta. Positions that net to zero are dropped.
    pub fn apply(&mut self, delta: &WalletDeltas) {
        self.balance += delta.balance;
        self.lp_tokens += delta.lp_tokens;
        self.withdrawal_shares += delta.withdrawal_shares;
        self.fees_paid += delta.fees_paid;
        for (mint_time, long) in &delta.longs {
            let entry = self.longs.entry(*mint_time).or_default();
            entry.balance += long.balance;
            if entry.balance.is_zero() {
                self.longs.remove(mint_time);
            }
        }
        for (mint_time, short) in &delta.shorts {
            let entry = self.shorts.entry(*mint_time).or_insert(Short {
                balance: Decimal::ZERO,
                open_share_price: short.open_share_price,
            });
            entry.balance += short.balance;
            if entry.balance.is_zero() {
                self.shorts.remove(mint_time);
            }
        }
    }
}

impl AddAssign<&WalletDeltas> for Wallet {
    fn add_assign(&mut self, rhs: &WalletDeltas) {
        self.apply(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_opens_and_closes_positions() {
        let mut wallet = Wallet::new(7, dec!(1000));
        let mut open = WalletDeltas::new(7);
        open.balance = dec!(-100);
        open.longs.insert(0, Long { balance: dec!(104) });
        wallet.apply(&open);
        assert_eq!(wallet.balance, dec!(900));
        assert_eq!(wallet.long_balance(0), dec!(104));

        let mut close = WalletDeltas::new(7);
        close.balance = dec!(103);
        close.longs.insert(0, Long { balance: dec!(-104) });
        wallet += &close;
        assert_eq!(wallet.balance, dec!(1003));
        assert!(wallet.longs.is_empty());
    }

    #[test]
    fn test_short_keeps_first_open_share_price() {
        let mut wallet = Wallet::new(1, dec!(50));
        let mut delta = WalletDeltas::new(1);
        delta.shorts.insert(86_400, Short { balance: dec!(10), open_share_price: dec!(1.01) });
        wallet.apply(&delta);
        delta.shorts.insert(86_400, Short { balance: dec!(5), open_share_price: dec!(1.01) });
        wallet.apply(&delta);
        assert_eq!(wallet.short_balance(86_400), dec!(15));
        assert_eq!(wallet.short_open_share_price(86_400), Some(dec!(1.01)));
        assert_eq!(wallet.short_open_share_price(0), None);
    }
}
