//! Store key layout shared by every ranking component.
//!
//! The strings below are a persisted contract: integration tests and
//! operational tooling address keys by these literal formats, so a change here
//! is a data migration.

use crate::identity::AvatarAddress;
use crate::shared::{ArenaError, ClanId, RoundIndex, SeasonId};

const PARTICIPANT_PREFIX: &str = "participant:";
const GROUP_PREFIX: &str = "group:";
const CLAN_PREFIX: &str = "clan:";

/// Prefix matching every key written by the engine
pub const SEASON_KEY_PREFIX: &str = "season:";

/// (season, round) pair every round-scoped key is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankingKey {
    pub season_id: SeasonId,
    pub round: RoundIndex,
}

impl RankingKey {
    pub fn new(season_id: SeasonId, round: RoundIndex) -> Self {
        Self { season_id, round }
    }

    fn base(&self) -> String {
        format!("season:{}:round:{}", self.season_id, self.round)
    }

    pub fn next_round(&self) -> Self {
        Self::new(self.season_id, self.round + 1)
    }

    /// `season:{s}:round:{r}:ranking`
    pub fn ranking(&self) -> String {
        format!("{}:ranking", self.base())
    }

    /// `season:{s}:round:{r}:ranking:status`
    pub fn ranking_status(&self) -> String {
        format!("{}:ranking:status", self.base())
    }

    /// `season:{s}:round:{r}:ranking-group`
    pub fn grouped_ranking(&self) -> String {
        format!("{}:ranking-group", self.base())
    }

    /// `season:{s}:round:{r}:ranking-group:status`
    pub fn grouped_status(&self) -> String {
        format!("{}:ranking-group:status", self.base())
    }

    /// `season:{s}:round:{r}:ranking-group:index`
    pub fn grouped_index(&self) -> String {
        format!("{}:ranking-group:index", self.base())
    }

    /// `season:{s}:round:{r}:group:{score}`
    pub fn score_bucket(&self, score: i64) -> String {
        format!("{}:{}", self.base(), group_member(score))
    }

    /// `season:{s}:round:{r}:group:`, shared by every score bucket of the round
    pub fn score_bucket_prefix(&self) -> String {
        format!("{}:{}", self.base(), GROUP_PREFIX)
    }

    /// `season:{s}:round:{r}:clan:{c}:ranking`
    pub fn clan_ranking(&self, clan_id: ClanId) -> String {
        format!("{}:clan:{}:ranking", self.base(), clan_id)
    }

    /// `season:{s}:round:{r}:clan:{c}:ranking:status`
    pub fn clan_status(&self, clan_id: ClanId) -> String {
        format!("{}:clan:{}:ranking:status", self.base(), clan_id)
    }

    /// `season:{s}:round:{r}:clans`
    pub fn clan_registry(&self) -> String {
        format!("{}:clans", self.base())
    }

    /// `season:{s}:round:{r}:ranking-clan`
    pub fn global_clan_ranking(&self) -> String {
        format!("{}:ranking-clan", self.base())
    }

    /// `season:{s}:round:{r}:ranking-clan:status`
    pub fn global_clan_status(&self) -> String {
        format!("{}:ranking-clan:status", self.base())
    }
}

/// `participant:{lowercase hex}`
pub fn participant_member(address: &AvatarAddress) -> String {
    format!("{}{}", PARTICIPANT_PREFIX, address.to_hex())
}

pub fn parse_participant_member(member: &str) -> Result<AvatarAddress, ArenaError> {
    member
        .strip_prefix(PARTICIPANT_PREFIX)
        .ok_or_else(|| ArenaError::Validation(format!("not a participant member: {}", member)))?
        .parse()
}

/// `group:{score}`
pub fn group_member(score: i64) -> String {
    format!("{}{}", GROUP_PREFIX, score)
}

pub fn parse_group_member(member: &str) -> Result<i64, ArenaError> {
    member
        .strip_prefix(GROUP_PREFIX)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ArenaError::Validation(format!("not a group member: {}", member)))
}

/// `clan:{c}`
pub fn clan_member(clan_id: ClanId) -> String {
    format!("{}{}", CLAN_PREFIX, clan_id)
}

pub fn parse_clan_member(member: &str) -> Result<ClanId, ArenaError> {
    member
        .strip_prefix(CLAN_PREFIX)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ArenaError::Validation(format!("not a clan member: {}", member)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::address;

    #[test]
    fn round_keys_use_literal_formats() {
        let key = RankingKey::new(3, 7);

        assert_eq!(key.ranking(), "season:3:round:7:ranking");
        assert_eq!(key.ranking_status(), "season:3:round:7:ranking:status");
        assert_eq!(key.grouped_ranking(), "season:3:round:7:ranking-group");
        assert_eq!(key.grouped_status(), "season:3:round:7:ranking-group:status");
        assert_eq!(key.grouped_index(), "season:3:round:7:ranking-group:index");
        assert_eq!(key.score_bucket(1000), "season:3:round:7:group:1000");
        assert_eq!(key.score_bucket(-5), "season:3:round:7:group:-5");
        assert_eq!(key.score_bucket_prefix(), "season:3:round:7:group:");
        assert!(key.score_bucket(-5).starts_with(&key.score_bucket_prefix()));
        assert!(!key.grouped_ranking().starts_with(&key.score_bucket_prefix()));
        assert_eq!(key.clan_ranking(12), "season:3:round:7:clan:12:ranking");
        assert_eq!(key.clan_status(12), "season:3:round:7:clan:12:ranking:status");
        assert_eq!(key.clan_registry(), "season:3:round:7:clans");
        assert_eq!(key.global_clan_ranking(), "season:3:round:7:ranking-clan");
        assert_eq!(
            key.global_clan_status(),
            "season:3:round:7:ranking-clan:status"
        );
        assert_eq!(key.next_round(), RankingKey::new(3, 8));
    }

    #[test]
    fn member_tokens_round_trip() {
        let who = address(42);
        let member = participant_member(&who);
        assert!(member.starts_with("participant:ab"));
        assert_eq!(parse_participant_member(&member).unwrap(), who);

        assert_eq!(parse_group_member(&group_member(-12)).unwrap(), -12);
        assert_eq!(parse_clan_member(&clan_member(9)).unwrap(), 9);
    }

    #[test]
    fn rejects_foreign_member_tokens() {
        assert!(parse_participant_member("clan:1").is_err());
        assert!(parse_group_member("group:abc").is_err());
        assert!(parse_clan_member("participant:1").is_err());
    }
}
