//! Announcement content built from a roster snapshot.

use crate::interest::CommonInterest;
use crate::roster::{PendingArrival, RosterSnapshot};
use crate::types::MemberId;
use serde::Serialize;

/// Which layout the announcement uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Nobody is active.
    Empty,
    /// One active member.
    Single,
    /// Two or more active members: member list, common items, excluded members.
    Group,
}

/// Everything the announcement shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Active members in join order.
    pub active: Vec<MemberId>,
    /// Pending arrivals, soonest first.
    pub pending: Vec<PendingArrival>,
    /// Items shared by every member with a library.
    pub common: Vec<String>,
    /// Active members without a library.
    pub excluded: Vec<MemberId>,
    /// Roster generation this summary was built from.
    pub generation: u64,
}

impl Summary {
    #[must_use]
    pub fn new(snapshot: &RosterSnapshot, interest: CommonInterest) -> Self {
        let mut pending = snapshot.pending.clone();
        pending.sort_by_key(|p| (p.target_time, p.member_id));

        Self {
            active: snapshot.active.clone(),
            pending,
            common: interest.common,
            excluded: interest.excluded,
            generation: snapshot.generation,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SummaryKind {
        match self.active.len() {
            0 => SummaryKind::Empty,
            1 => SummaryKind::Single,
            _ => SummaryKind::Group,
        }
    }

    /// Whether the roster has no active member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Markdown text of the announcement (French).
    #[must_use]
    pub fn text(&self) -> String {
        let mut text = match self.kind() {
            SummaryKind::Empty => "😴 Personne n'est prêt à jouer pour le moment.".to_string(),
            SummaryKind::Single => {
                let member = self.active.first().map(MemberId::mention).unwrap_or_default();
                format!("🎮 {member} est prêt à jouer !")
            }
            SummaryKind::Group => self.group_text(),
        };

        if !self.pending.is_empty() {
            text.push_str("\n\n⏳ **Arrivées prévues :**");
            for (i, arrival) in self.pending.iter().enumerate() {
                let time = format!("<t:{}:t>", arrival.target_time.timestamp());
                // Only the soonest arrival is highlighted
                let time = if i == 0 { format!("**{time}**") } else { time };
                text.push_str(&format!("\n- {} vers {time}", arrival.member_id.mention()));
            }
        }

        text
    }

    fn group_text(&self) -> String {
        let mut text = format!(
            "🎮 **Joueurs prêts ({}) :** {}",
            self.active.len(),
            mentions(&self.active)
        );

        if self.common.is_empty() {
            text.push_str("\n\n🤷 Aucun jeu en commun pour le moment.");
        } else {
            text.push_str("\n\n🕹️ **Jeux en commun :** ");
            text.push_str(&self.common.join(", "));
        }

        if !self.excluded.is_empty() {
            text.push_str(&format!(
                "\n\nℹ️ Sans bibliothèque enregistrée : {}. Ajoutez vos jeux avec /addgame !",
                mentions(&self.excluded)
            ));
        }

        text
    }
}

fn mentions(members: &[MemberId]) -> String {
    members
        .iter()
        .map(MemberId::mention)
        .collect::<Vec<_>>()
        .join(", ")
}
