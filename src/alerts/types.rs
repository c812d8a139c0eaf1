use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of alert types, ordered low to high priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    #[default]
    OwlInArea,
    OwlOnBox,
    OwlInBox,
    TwoOwls,
    TwoOwlsInBox,
    EggsOrBabies,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::OwlInArea,
        AlertType::OwlOnBox,
        AlertType::OwlInBox,
        AlertType::TwoOwls,
        AlertType::TwoOwlsInBox,
        AlertType::EggsOrBabies,
    ];

    /// Static priority, higher is more urgent. Unique per type.
    pub fn priority(&self) -> u8 {
        match self {
            AlertType::OwlInArea => 1,
            AlertType::OwlOnBox => 2,
            AlertType::OwlInBox => 3,
            AlertType::TwoOwls => 4,
            AlertType::TwoOwlsInBox => 5,
            AlertType::EggsOrBabies => 6,
        }
    }

    /// Factor applied to the global alert delay to get this type's cooldown
    pub fn cooldown_multiplier(&self) -> u32 {
        match self {
            AlertType::OwlInArea | AlertType::OwlOnBox | AlertType::OwlInBox => 1,
            AlertType::TwoOwls | AlertType::TwoOwlsInBox => 2,
            AlertType::EggsOrBabies => 4,
        }
    }

    /// Subject line used in notifications
    pub fn name(&self) -> &'static str {
        match self {
            AlertType::OwlInArea => "Owl In Area",
            AlertType::OwlOnBox => "Owl On Box",
            AlertType::OwlInBox => "Owl In Box",
            AlertType::TwoOwls => "Two Owls",
            AlertType::TwoOwlsInBox => "Two Owls In Box",
            AlertType::EggsOrBabies => "Eggs Or Babies",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::OwlInArea => "owl_in_area",
            AlertType::OwlOnBox => "owl_on_box",
            AlertType::OwlInBox => "owl_in_box",
            AlertType::TwoOwls => "two_owls",
            AlertType::TwoOwlsInBox => "two_owls_in_box",
            AlertType::EggsOrBabies => "eggs_or_babies",
        }
    }

    /// Types that suppress this one while active
    pub fn higher_priority(&self) -> impl Iterator<Item = AlertType> + '_ {
        AlertType::ALL
            .into_iter()
            .filter(move |other| other.priority() > self.priority())
    }

    /// Whether this type describes a subject inside the box
    pub fn is_in_container(&self) -> bool {
        matches!(self, AlertType::OwlInBox | AlertType::TwoOwlsInBox)
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_priorities_are_unique_and_ordered() {
        let priorities: HashSet<u8> = AlertType::ALL.iter().map(AlertType::priority).collect();
        assert_eq!(priorities.len(), AlertType::ALL.len());

        assert!(AlertType::ALL
            .windows(2)
            .all(|pair| pair[0].priority() < pair[1].priority()));
    }

    #[test]
    fn test_higher_priority_iterator() {
        let above: Vec<AlertType> = AlertType::OwlInBox.higher_priority().collect();
        assert_eq!(
            above,
            vec![
                AlertType::TwoOwls,
                AlertType::TwoOwlsInBox,
                AlertType::EggsOrBabies
            ]
        );
        assert_eq!(AlertType::EggsOrBabies.higher_priority().count(), 0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&AlertType::TwoOwlsInBox).unwrap();
        assert_eq!(json, "\"two_owls_in_box\"");
        let parsed: AlertType = serde_json::from_str("\"owl_on_box\"").unwrap();
        assert_eq!(parsed, AlertType::OwlOnBox);
        assert_eq!(AlertType::OwlOnBox.as_str(), "owl_on_box");
    }
}
