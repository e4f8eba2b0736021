//! Wallet Port - Agent Balances
//!
//! The market validates requests against, and hands results to, a wallet
//! through this trait. Position balances are keyed by mint time.

use rust_decimal::Decimal;

use crate::domain::wallet::{Wallet, WalletDeltas};

/// Keyed balances the market trades against.
pub trait WalletLedger {
    fn address(&self) -> u64;

    /// Base available to spend.
    fn base_balance(&self) -> Decimal;

    fn long_balance(&self, mint_time: u64) -> Decimal;

    fn short_balance(&self, mint_time: u64) -> Decimal;

    /// Share price recorded when the short minted at `mint_time` was opened.
    fn short_open_share_price(&self, mint_time: u64) -> Option<Decimal>;

    fn lp_tokens(&self) -> Decimal;

    fn withdrawal_shares(&self) -> Decimal;

    /// Apply the wallet side of a completed trade.
    fn update(&mut self, delta: &WalletDeltas);
}

impl WalletLedger for Wallet {
    fn address(&self) -> u64 {
        self.address
    }

    fn base_balance(&self) -> Decimal {
        self.balance
    }

    fn long_balance(&self, mint_time: u64) -> Decimal {
        Self::long_balance(self, mint_time)
    }

    fn short_balance(&self, mint_time: u64) -> Decimal {
        Self::short_balance(self, mint_time)
    }

    fn short_open_share_price(&self, mint_time: u64) -> Option<Decimal> {
        Self::short_open_share_price(self, mint_time)
    }

    fn lp_tokens(&self) -> Decimal {
        self.lp_tokens
    }

    fn withdrawal_shares(&self) -> Decimal {
        self.withdrawal_shares
    }

    fn update(&mut self, delta: &WalletDeltas) {
        self.apply(delta);
    }
}
