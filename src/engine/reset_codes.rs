use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::now_ms;
use super::{Engine, EngineError};

impl Engine {
    /// Issue a single-use password-reset code for `user_id`, valid for
    /// fifteen minutes. The code is persisted, so it outlives a restart, and
    /// published to the notification sinks for delivery.
    pub async fn issue_reset_code(self: &Arc<Self>, user_id: Ulid) -> Result<ResetCode, EngineError> {
        self.detached(move |engine| async move { engine.issue_code(user_id).await })
            .await
    }

    async fn issue_code(&self, user_id: Ulid) -> Result<ResetCode, EngineError> {
        if self.reset_codes.len() >= MAX_LIVE_RESET_CODES {
            return Err(EngineError::LimitExceeded("too many outstanding reset codes"));
        }
        let now = now_ms();
        let code = loop {
            let candidate = rand::thread_rng()
                .gen_range(RESET_CODE_MIN..=RESET_CODE_MAX)
                .to_string();
            if !self.reset_codes.contains_key(&candidate) {
                break candidate;
            }
        };
        let reset = ResetCode {
            code,
            user_id,
            expires_at: now + RESET_CODE_TTL_MS,
        };

        let _gate = self.compaction_gate.read().await;
        let event = Event::ResetCodeIssued { reset: reset.clone() };
        self.wal_append(&event).await?;
        self.index_event(&event);
        self.notify.send(&event);
        info!("reset code issued for user {user_id}");
        Ok(reset)
    }

    /// Consume a code. Unknown, already used, and expired codes all fail the
    /// same way.
    pub async fn redeem_reset_code(self: &Arc<Self>, code: &str) -> Result<Ulid, EngineError> {
        let code = code.to_string();
        self.detached(move |engine| async move { engine.redeem_reset_code_at(&code, now_ms()).await })
            .await
    }

    pub(super) async fn redeem_reset_code_at(&self, code: &str, now: Ms) -> Result<Ulid, EngineError> {
        let _gate = self.compaction_gate.read().await;
        // Removing first makes the claim atomic between concurrent redeemers.
        let (_, reset) = self
            .reset_codes
            .remove(code)
            .ok_or(EngineError::ResetCodeNotFound)?;
        let event = Event::ResetCodeRedeemed {
            code: reset.code.clone(),
            user_id: reset.user_id,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.reset_codes.insert(reset.code.clone(), reset);
            return Err(e);
        }
        if reset.expires_at <= now {
            debug!("reset code for user {} expired", reset.user_id);
            return Err(EngineError::ResetCodeNotFound);
        }
        self.notify.send(&event);
        info!("reset code redeemed for user {}", reset.user_id);
        Ok(reset.user_id)
    }

    /// Codes whose expiry has passed.
    pub fn collect_expired_reset_codes(&self, now: Ms) -> Vec<String> {
        self.reset_codes
            .iter()
            .filter(|e| e.value().expires_at <= now)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drop an expired code. Returns false if it was already gone or is
    /// still live.
    pub async fn purge_reset_code(&self, code: &str, now: Ms) -> Result<bool, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let Some((_, reset)) = self.reset_codes.remove_if(code, |_, r| r.expires_at <= now) else {
            return Ok(false);
        };
        let event = Event::ResetCodeRedeemed {
            code: reset.code.clone(),
            user_id: reset.user_id,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.reset_codes.insert(reset.code.clone(), reset);
            return Err(e);
        }
        Ok(true)
    }

    pub fn live_reset_codes(&self) -> usize {
        self.reset_codes.len()
    }
}
