use serde::{Deserialize, Serialize};

use crate::identity::AvatarAddress;
use crate::keys::parse_participant_member;
use crate::shared::ArenaError;
use crate::store::ScoredMember;

/// A participant and its score within one round's ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankingEntry {
    pub address: AvatarAddress,
    pub score: i64,
}

impl RankingEntry {
    pub fn new(address: AvatarAddress, score: i64) -> Self {
        Self { address, score }
    }

    pub(crate) fn from_scored(scored: &ScoredMember) -> Result<Self, ArenaError> {
        Ok(Self {
            address: parse_participant_member(&scored.member)?,
            score: scored.score,
        })
    }
}
