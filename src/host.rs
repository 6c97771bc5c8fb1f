use serde::{Deserialize, Serialize};

/// A video sitting in a hosted playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    /// Id of the playlist item wrapping the video, needed for removal.
    pub item_id: String,
}

/// One page of playlist items.
#[derive(Debug, Clone, Default)]
pub struct VideoPage {
    pub items: Vec<HostedVideo>,
    pub next_page: Option<String>,
}

/// The hosting-side calls the batch needs. Implementations own
/// credentials, transport and retries; the library never talks to the
/// network itself.
pub trait VideoHost {
    fn playlist_page(
        &mut self,
        playlist_id: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> anyhow::Result<VideoPage>;

    fn update_video(&mut self, video_id: &str, title: &str, description: &str)
        -> anyhow::Result<()>;

    fn add_to_playlist(&mut self, playlist_id: &str, video_id: &str) -> anyhow::Result<()>;

    fn remove_playlist_item(&mut self, item_id: &str) -> anyhow::Result<()>;

    /// Creates a playlist and returns its id.
    fn create_playlist(&mut self, title: &str, description: &str) -> anyhow::Result<String>;
}

/// Unit cost of a list call.
pub const COST_LIST: u32 = 1;
/// Unit cost of a mutating call.
pub const COST_WRITE: u32 = 50;
/// Default daily unit budget, one short of the host's real quota so a
/// miscount trips the ledger before the service.
pub const DEFAULT_QUOTA_BUDGET: u32 = 5999;

/// Caller-side accounting of daily API units. The host does not tell us
/// mid-run how much is left, so every charged call goes through here
/// and the batch stops cleanly once the budget is gone. A ledger loaded
/// from disk may carry `spent` past `budget`; that state reads as an
/// empty budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLedger {
    budget: u32,
    spent: u32,
}

impl QuotaLedger {
    pub fn new(budget: u32) -> Self {
        Self { budget, spent: 0 }
    }

    /// Charges `cost` units. On `false` nothing was charged and the
    /// budget cannot cover the call.
    pub fn try_charge(&mut self, cost: u32) -> bool {
        match self.spent.checked_add(cost) {
            Some(total) if total <= self.budget => {
                self.spent = total;
                true
            }
            _ => false,
        }
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.spent
            .checked_add(cost)
            .is_some_and(|total| total <= self.budget)
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }

    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.spent)
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_charges_until_exhausted() {
        let mut ledger = QuotaLedger::new(120);
        assert!(ledger.try_charge(COST_WRITE));
        assert!(ledger.try_charge(COST_WRITE));
        assert_eq!(ledger.spent(), 100);
        assert_eq!(ledger.remaining(), 20);
        assert!(!ledger.try_charge(COST_WRITE));
        assert_eq!(ledger.spent(), 100);
        assert!(ledger.try_charge(COST_LIST));
        assert_eq!(ledger.remaining(), 19);
    }

    #[test]
    fn test_can_afford_does_not_charge() {
        let ledger = QuotaLedger::new(10);
        assert!(ledger.can_afford(10));
        assert!(!ledger.can_afford(11));
        assert_eq!(ledger.spent(), 0);
    }

    #[test]
    fn test_default_budget() {
        let ledger = QuotaLedger::default();
        assert_eq!(ledger.remaining(), DEFAULT_QUOTA_BUDGET);
    }

    #[test]
    fn test_hand_edited_ledger_reads_as_empty() {
        // An operator can lower the budget in the saved file below what
        // a past run already spent.
        let mut ledger: QuotaLedger =
            serde_json::from_str(r#"{"budget":500,"spent":5999}"#).unwrap();
        assert_eq!(ledger.remaining(), 0);
        assert!(!ledger.can_afford(COST_LIST));
        assert!(!ledger.try_charge(COST_LIST));
        assert_eq!(ledger.spent(), 5999);

        let mut ledger: QuotaLedger =
            serde_json::from_str(r#"{"budget":4294967295,"spent":4294967295}"#).unwrap();
        assert_eq!(ledger.remaining(), 0);
        assert!(!ledger.try_charge(1));
    }
}
