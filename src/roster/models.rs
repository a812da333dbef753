use serde::{Deserialize, Serialize};

use crate::identity::AvatarAddress;
use crate::shared::{ClanId, SeasonId};

/// A participant registered in a season, as held by the relational roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub address: AvatarAddress,
    pub clan_id: Option<ClanId>,
    pub score: i64,
}

impl ParticipantRecord {
    pub fn new(address: AvatarAddress, clan_id: Option<ClanId>, score: i64) -> Self {
        Self {
            address,
            clan_id,
            score,
        }
    }
}

/// Medals one participant earned in one season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedalRecord {
    pub address: AvatarAddress,
    pub season_id: SeasonId,
    pub medal_count: i32,
}
