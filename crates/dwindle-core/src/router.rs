//! Fixed-rate swap router.
//!
//! [`FixedRateRouter`] quotes each hop of a path at a configured
//! `numerator / denominator` rate and pays out of its own liquidity, which is
//! held in the [`TokenBank`] under the router's address. Swaps are
//! all-or-nothing: every check runs before the first balance moves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RouterError, TokenError};
use crate::token::TokenBank;
use crate::traits::{Clock, FungibleToken, SwapRouter};
use crate::types::AccountId;

/// Swap router with static per-pair exchange rates.
pub struct FixedRateRouter {
    address: AccountId,
    bank: TokenBank,
    clock: Arc<dyn Clock>,
    /// `(from, to)` → `(numerator, denominator)`.
    rates: RwLock<HashMap<(AccountId, AccountId), (u128, u128)>>,
}

impl FixedRateRouter {
    pub fn new(address: AccountId, bank: TokenBank, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            bank,
            clock,
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Quote `from → to` at `numerator / denominator` output per input unit.
    pub fn set_rate(&self, from: AccountId, to: AccountId, numerator: u128, denominator: u128) {
        self.rates.write().insert((from, to), (numerator, denominator.max(1)));
    }

    fn hop(&self, from: &AccountId, to: &AccountId, amount_in: u128) -> Result<u128, RouterError> {
        let (num, den) = self
            .rates
            .read()
            .get(&(*from, *to))
            .copied()
            .ok_or_else(|| RouterError::UnknownPair {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        amount_in
            .checked_mul(num)
            .map(|v| v / den)
            .ok_or(RouterError::ArithmeticOverflow)
    }
}

impl SwapRouter for FixedRateRouter {
    fn address(&self) -> AccountId {
        self.address
    }

    fn get_amount_out(&self, path: &[AccountId], amount_in: u128) -> Result<u128, RouterError> {
        if path.len() < 2 {
            return Err(RouterError::InvalidPath(path.len()));
        }
        path.windows(2)
            .try_fold(amount_in, |amount, pair| self.hop(&pair[0], &pair[1], amount))
    }

    fn swap_exact_tokens_for_tokens(
        &self,
        caller: &AccountId,
        path: &[AccountId],
        amount_in: u128,
        min_out: u128,
        deadline: u64,
        to: &AccountId,
    ) -> Result<u128, RouterError> {
        let now = self.clock.now().timestamp;
        if deadline < now {
            return Err(RouterError::DeadlinePassed { deadline, now });
        }
        let amount_out = self.get_amount_out(path, amount_in)?;
        if amount_out < min_out {
            return Err(RouterError::SlippageExceeded { got: amount_out, min_out });
        }

        let token_in = self.bank.token(&path[0])?;
        let token_out = self.bank.token(&path[path.len() - 1])?;

        // Pre-check both legs so neither transfer can fail half-way.
        let allowed = token_in.allowance(caller, &self.address);
        if allowed < amount_in {
            return Err(TokenError::InsufficientAllowance { have: allowed, need: amount_in }.into());
        }
        let liquidity = token_out.balance_of(&self.address);
        if liquidity < amount_out {
            return Err(TokenError::InsufficientBalance { have: liquidity, need: amount_out }.into());
        }

        token_in.transfer_from(&self.address, caller, &self.address, amount_in)?;
        token_out.transfer(&self.address, to, amount_out)?;
        debug!(%caller, hops = path.len() - 1, amount_in, amount_out, "router: swap");
        Ok(amount_out)
    }
}
