use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::store::AttemptStore;

/// Login attempt counters, one per client IP and one per IP+email pair.
///
/// Every attempt takes a slot from both windows before the password is
/// checked, so parallel guesses cannot all get past the limit. Once more than
/// `max_attempts` slots are taken inside one window, logins from that IP are
/// refused until the window runs out. A correct password releases both.
#[derive(Clone)]
pub struct LoginThrottle {
    attempts: Arc<dyn AttemptStore>,
    max_attempts: u32,
    window: Duration,
}

fn ip_key(ip: &str) -> String {
    format!("login:{}", ip)
}

fn account_key(ip: &str, email: &str) -> String {
    format!("login:{}:{}", ip, email)
}

impl LoginThrottle {
    pub fn new(attempts: Arc<dyn AttemptStore>, max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts,
            max_attempts,
            window,
        }
    }

    /// Count one attempt. Returns the attempts used by this IP in the window.
    pub async fn acquire(&self, ip: &str, email: &str) -> AppResult<u64> {
        let per_ip = self.attempts.hit(&ip_key(ip), self.window).await?;
        let per_account = self.attempts.hit(&account_key(ip, email), self.window).await?;

        let max = u64::from(self.max_attempts);
        for state in [per_ip, per_account] {
            if state.count > max {
                return Err(AppError::TooManyAttempts {
                    retry_after_secs: state.resets_in_secs,
                });
            }
        }
        Ok(per_ip.count)
    }

    pub async fn release(&self, ip: &str, email: &str) -> AppResult<()> {
        self.attempts.clear(&ip_key(ip)).await?;
        Ok(self.attempts.clear(&account_key(ip, email)).await?)
    }
}
