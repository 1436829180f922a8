//! Damage teams and the attacker/victim eligibility matrix.
//!
//! A [`Team`] pairs a [`TeamType`] with a team number used to distinguish
//! individual PvP parties within the same type. [`Team::can_damage`] is a pure
//! function of both sides' [`TeamType`] (and, for [`TeamType::Indiscriminate`],
//! whether the victim is the attacker itself) -- it never consults world state.

use serde::{Deserialize, Serialize};

/// The closed set of team types a damage source or entity can belong to.
///
/// This enumeration is fixed -- it is not configuration-driven and the
/// variant set must not grow without updating [`Team::can_damage`]'s matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamType {
    /// No team assigned; cannot participate in damage at all.
    Null,
    /// Non-PvP-enabled players and player-allied NPCs.
    Friendly,
    /// Hostile and neutral NPCs and monsters.
    Enemy,
    /// PvP-enabled players.
    Pvp,
    /// Cannot damage anything; can be damaged by Friendly/Pvp/Assistant.
    Passive,
    /// Cannot damage or be damaged by anything.
    Ghostly,
    /// Cannot damage enemies; can be damaged by anything except Enemy.
    Environment,
    /// Damages anything except Ghostly; damaged by anything except
    /// Ghostly/Passive. Used for self-damage sources (traps, fall damage).
    Indiscriminate,
    /// Cannot damage Friendly and cannot be damaged by anything.
    Assistant,
}

/// A team number distinguishing individual PvP parties of the same
/// [`TeamType`]. `0` is the default / no-party value.
pub type TeamNumber = u16;

/// An entity's or damage source's team assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team {
    pub team_type: TeamType,
    pub team_number: TeamNumber,
}

impl Team {
    pub fn new(team_type: TeamType, team_number: TeamNumber) -> Self {
        Self {
            team_type,
            team_number,
        }
    }

    /// A team with no damage participation at all.
    pub fn null() -> Self {
        Self::new(TeamType::Null, 0)
    }

    /// Whether `self` (the attacker) can damage `victim`.
    ///
    /// `victim_is_self` distinguishes the case where the attacker and victim
    /// are the same entity, which matters only for [`TeamType::Indiscriminate`]
    /// self-damage sources (traps, fall damage) -- everywhere else the matrix
    /// is a pure function of the two team types.
    pub fn can_damage(&self, victim: Team, victim_is_self: bool) -> bool {
        use TeamType::*;

        if self.team_type == Null || victim.team_type == Null {
            return false;
        }
        if self.team_type == Ghostly || victim.team_type == Ghostly {
            return false;
        }

        match (self.team_type, victim.team_type) {
            (Passive, _) => false,
            (Assistant, Friendly) => false,
            (_, Passive) => matches!(self.team_type, Friendly | Pvp | Assistant),
            (_, Assistant) => false,
            (Indiscriminate, victim_type) => {
                if victim_type == Passive {
                    false
                } else if victim_is_self {
                    true
                } else {
                    true
                }
            }
            (Environment, Enemy) => false,
            (Friendly, Friendly) => false,
            (Friendly, Enemy) => true,
            (Friendly, Environment) => true,
            (Friendly, Pvp) => false,
            (Enemy, Friendly) => true,
            (Enemy, Enemy) => false,
            (Enemy, Environment) => true,
            (Enemy, Pvp) => true,
            (Pvp, Friendly) => false,
            (Pvp, Enemy) => true,
            (Pvp, Environment) => true,
            (Pvp, Pvp) => self.team_number != victim.team_number,
            (Environment, Friendly) => true,
            (Environment, Pvp) => true,
            (Environment, Environment) => false,
            (Friendly, Indiscriminate) => true,
            (Enemy, Indiscriminate) => true,
            (Pvp, Indiscriminate) => true,
            (Environment, Indiscriminate) => true,
            (Assistant, Enemy) => true,
            (Assistant, Pvp) => true,
            (Assistant, Environment) => true,
            (Assistant, Indiscriminate) => true,
            // Every remaining pair involves Null and/or Ghostly on one side,
            // which the guards above already resolved to `false` before this
            // match runs; kept here only so the match is exhaustive.
            (Null, _) | (_, Null) | (Ghostly, _) | (_, Ghostly) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(tt: TeamType) -> Team {
        Team::new(tt, 0)
    }

    #[test]
    fn null_team_never_damages_or_is_damaged() {
        assert!(!t(TeamType::Null).can_damage(t(TeamType::Enemy), false));
        assert!(!t(TeamType::Enemy).can_damage(t(TeamType::Null), false));
    }

    #[test]
    fn ghostly_is_never_involved_in_damage() {
        for tt in [
            TeamType::Friendly,
            TeamType::Enemy,
            TeamType::Pvp,
            TeamType::Environment,
            TeamType::Indiscriminate,
        ] {
            assert!(!t(TeamType::Ghostly).can_damage(t(tt), false));
            assert!(!t(tt).can_damage(t(TeamType::Ghostly), false));
        }
    }

    #[test]
    fn friendly_damages_enemy_and_not_itself() {
        assert!(t(TeamType::Friendly).can_damage(t(TeamType::Enemy), false));
        assert!(!t(TeamType::Friendly).can_damage(t(TeamType::Friendly), false));
    }

    #[test]
    fn pvp_same_party_cannot_damage_each_other() {
        let a = Team::new(TeamType::Pvp, 1);
        let b = Team::new(TeamType::Pvp, 1);
        let c = Team::new(TeamType::Pvp, 2);
        assert!(!a.can_damage(b, false));
        assert!(a.can_damage(c, false));
    }

    #[test]
    fn passive_cannot_damage_anything() {
        for tt in [
            TeamType::Friendly,
            TeamType::Enemy,
            TeamType::Pvp,
            TeamType::Environment,
            TeamType::Indiscriminate,
            TeamType::Assistant,
        ] {
            assert!(!t(TeamType::Passive).can_damage(t(tt), false));
        }
    }

    #[test]
    fn assistant_cannot_be_damaged_by_anything() {
        for tt in [
            TeamType::Friendly,
            TeamType::Enemy,
            TeamType::Pvp,
            TeamType::Environment,
            TeamType::Indiscriminate,
        ] {
            assert!(!t(tt).can_damage(t(TeamType::Assistant), false));
        }
    }

    #[test]
    fn indiscriminate_damages_self() {
        let source = t(TeamType::Indiscriminate);
        assert!(source.can_damage(t(TeamType::Friendly), true));
        assert!(!source.can_damage(t(TeamType::Passive), true));
    }

    #[test]
    fn environment_does_not_damage_enemy() {
        assert!(!t(TeamType::Environment).can_damage(t(TeamType::Enemy), false));
        assert!(t(TeamType::Environment).can_damage(t(TeamType::Friendly), false));
    }

    #[test]
    fn matrix_is_total_function_no_panics() {
        let all = [
            TeamType::Null,
            TeamType::Friendly,
            TeamType::Enemy,
            TeamType::Pvp,
            TeamType::Passive,
            TeamType::Ghostly,
            TeamType::Environment,
            TeamType::Indiscriminate,
            TeamType::Assistant,
        ];
        for &a in &all {
            for &b in &all {
                let _ = t(a).can_damage(t(b), false);
                let _ = t(a).can_damage(t(b), true);
            }
        }
    }
}
