//! Trader identity resolution.
//!
//! Bots trade as characters bound to one account. Either an explicit id
//! list is given (checked against the account when one is set) or every
//! character of the account is used.

use anyhow::Result;
use tracing::info;

use crate::market::AccountDirectory;
use crate::types::{BotError, Trader, TraderId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraderRegistry {
    traders: Vec<Trader>,
}

impl TraderRegistry {
    /// Resolve the bot identities at startup.
    ///
    /// Fails with `BotError::Configuration` when neither an account nor an
    /// id list is given, when a listed id is not a character of the
    /// account, or when no trader remains.
    pub async fn resolve(
        account: u32,
        ids: &[TraderId],
        directory: &dyn AccountDirectory,
    ) -> Result<Self> {
        if account == 0 && ids.is_empty() {
            return Err(BotError::Configuration(
                "either bot.account or bot.traders must be set".into(),
            )
            .into());
        }

        let mut resolved: Vec<TraderId> = if account == 0 {
            ids.to_vec()
        } else {
            let characters = directory.characters(account).await?;
            if ids.is_empty() {
                characters
            } else {
                if let Some(stray) = ids.iter().find(|id| !characters.contains(id)) {
                    return Err(BotError::Configuration(format!(
                        "trader {stray} is not a character of account {account}"
                    ))
                    .into());
                }
                ids.to_vec()
            }
        };
        resolved.sort_unstable();
        resolved.dedup();

        if resolved.is_empty() {
            return Err(BotError::Configuration(format!("no trader characters on account {account}")).into());
        }

        info!(account, traders = ?resolved, "Trader identities resolved");
        Ok(Self {
            traders: resolved.into_iter().map(|id| Trader { id, account }).collect(),
        })
    }

    /// Registry over explicit ids, for tests and embedded use.
    pub fn from_ids(account: u32, ids: &[TraderId]) -> Self {
        Self {
            traders: ids.iter().map(|&id| Trader { id, account }).collect(),
        }
    }

    pub fn traders(&self) -> &[Trader] {
        &self.traders
    }

    pub fn ids(&self) -> Vec<TraderId> {
        self.traders.iter().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.traders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traders.is_empty()
    }
}
